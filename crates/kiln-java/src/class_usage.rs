//! Per-source class usage tracking
//!
//! While compiling, the compiler reports every upstream class each source
//! resolved symbols against. With tracking enabled these reports are written
//! to a dependency file that lets later builds skip recompilation when none
//! of the used classes changed.
//!
//! File format: one JSON object per line, sorted by source:
//!
//! ```text
//! {"source":"java/com/example/A.java","classes":["com.lib.X","com.lib.Y"]}
//! ```

use crate::error::{BuildError, BuildResult};
use crate::filesystem::ProjectFilesystem;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Used classes per compiled source
pub type ClassUsage = BTreeMap<PathBuf, BTreeSet<String>>;

/// Receives class usage reports from the compiler
pub trait ClassUsageFileWriter: fmt::Debug + Send {
    /// Register a source being compiled, even if it ends up using nothing
    fn record_source(&mut self, source: &Path);

    /// Record that `source` used `class_name`
    fn record_usage(&mut self, source: &Path, class_name: &str);

    /// Flush recorded usage once compilation has finished
    fn write_file(&self, filesystem: &ProjectFilesystem) -> BuildResult<()>;

    /// Destination of the dependency file, if one is written
    fn dep_file(&self) -> Option<&Path>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassUsageRecord {
    source: PathBuf,
    classes: BTreeSet<String>,
}

/// Tracker that writes the dependency file
#[derive(Debug, Clone)]
pub struct DefaultClassUsageFileWriter {
    dep_file: PathBuf,
    usage: ClassUsage,
}

impl DefaultClassUsageFileWriter {
    /// Tracker writing to a project-relative dependency file path
    pub fn new(dep_file: impl Into<PathBuf>) -> Self {
        Self {
            dep_file: dep_file.into(),
            usage: ClassUsage::new(),
        }
    }

    /// Usage recorded so far
    pub fn usage(&self) -> &ClassUsage {
        &self.usage
    }
}

impl ClassUsageFileWriter for DefaultClassUsageFileWriter {
    fn record_source(&mut self, source: &Path) {
        self.usage.entry(source.to_path_buf()).or_default();
    }

    fn record_usage(&mut self, source: &Path, class_name: &str) {
        self.usage
            .entry(source.to_path_buf())
            .or_default()
            .insert(class_name.to_string());
    }

    fn write_file(&self, filesystem: &ProjectFilesystem) -> BuildResult<()> {
        let path = filesystem.resolve(&self.dep_file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::directory(parent, e))?;
        }

        let mut contents = String::new();
        for (source, classes) in &self.usage {
            let record = ClassUsageRecord {
                source: source.clone(),
                classes: classes.clone(),
            };
            let line = serde_json::to_string(&record).map_err(|e| {
                BuildError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            contents.push_str(&line);
            contents.push('\n');
        }

        fs::write(&path, contents).map_err(|e| BuildError::io(&path, e))?;
        debug!(
            "Wrote class usage for {} sources to {}",
            self.usage.len(),
            path.display()
        );
        Ok(())
    }

    fn dep_file(&self) -> Option<&Path> {
        Some(&self.dep_file)
    }
}

/// Tracker used when class usage tracking is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpClassUsageFileWriter;

impl ClassUsageFileWriter for NoOpClassUsageFileWriter {
    fn record_source(&mut self, _source: &Path) {}

    fn record_usage(&mut self, _source: &Path, _class_name: &str) {}

    fn write_file(&self, _filesystem: &ProjectFilesystem) -> BuildResult<()> {
        Ok(())
    }

    fn dep_file(&self) -> Option<&Path> {
        None
    }
}

/// Parse dependency file contents written by `DefaultClassUsageFileWriter`
pub fn parse_class_usage(path: &Path, contents: &str) -> BuildResult<ClassUsage> {
    let mut usage = ClassUsage::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ClassUsageRecord = serde_json::from_str(line)
            .map_err(|e| BuildError::corrupt_metadata(path, index + 1, e.to_string()))?;
        usage.entry(record.source).or_default().extend(record.classes);
    }
    Ok(usage)
}

/// Read a dependency file
pub fn read_class_usage_file(path: &Path) -> BuildResult<ClassUsage> {
    let contents = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
    parse_class_usage(path, &contents)
}
