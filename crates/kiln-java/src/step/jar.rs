//! Jar packaging with class removal

use crate::error::{BuildError, BuildResult};
use crate::filesystem::ProjectFilesystem;
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

const DEFAULT_MANIFEST: &str = "Manifest-Version: 1.0\r\nCreated-By: kiln\r\n";

/// Default compression level (6 = good balance between speed and size)
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

/// Patterns naming classes that must not end up in a jar
#[derive(Debug, Clone, Default)]
pub struct RemoveClassesPatternsMatcher {
    patterns: Vec<Regex>,
}

impl RemoveClassesPatternsMatcher {
    /// Matcher that removes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// Compile patterns, rejecting invalid regular expressions
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> BuildResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    BuildError::ConfigError(format!(
                        "invalid remove_classes pattern '{}': {}",
                        p.as_ref(),
                        e
                    ))
                })
            })
            .collect::<BuildResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a dotted class name matches any pattern anywhere in the name
    pub fn should_remove_class(&self, class_name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(class_name))
    }

    /// Whether a jar entry holds a class that must be removed
    pub fn should_remove_entry(&self, entry_name: &str) -> bool {
        class_name_of_entry(entry_name)
            .map(|class_name| self.should_remove_class(&class_name))
            .unwrap_or(false)
    }
}

/// `com/example/Foo$Inner.class` → `com.example.Foo$Inner`
pub fn class_name_of_entry(entry_name: &str) -> Option<String> {
    entry_name
        .strip_suffix(".class")
        .filter(|stem| !stem.is_empty())
        .map(|stem| stem.replace('/', "."))
}

/// Packaging of a directory into a jar
#[derive(Debug, Clone)]
pub struct JarParams {
    /// Directory whose contents become the jar entries
    pub classes_dir: PathBuf,
    /// Destination jar
    pub output_jar: PathBuf,
    /// Main class recorded in the manifest
    pub main_class: Option<String>,
    /// Absolute path of a manifest to use instead of the default one
    pub manifest: Option<PathBuf>,
    /// Classes elided from the jar
    pub remove_classes: RemoveClassesPatternsMatcher,
    /// 0 stores entries, 1-9 deflates with that level
    pub compression_level: i32,
}

impl JarParams {
    pub fn new(classes_dir: impl Into<PathBuf>, output_jar: impl Into<PathBuf>) -> Self {
        Self {
            classes_dir: classes_dir.into(),
            output_jar: output_jar.into(),
            main_class: None,
            manifest: None,
            remove_classes: RemoveClassesPatternsMatcher::empty(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn with_manifest(mut self, manifest: Option<PathBuf>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_main_class(mut self, main_class: Option<String>) -> Self {
        self.main_class = main_class;
        self
    }

    pub fn with_remove_classes(mut self, remove_classes: RemoveClassesPatternsMatcher) -> Self {
        self.remove_classes = remove_classes;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }
}

fn file_options(level: i32) -> FileOptions {
    let options = FileOptions::default().last_modified_time(DateTime::default());
    if level == 0 {
        options.compression_method(CompressionMethod::Stored)
    } else {
        options
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(level))
    }
}

fn manifest_contents(manifest: Option<&Path>, main_class: Option<&str>) -> BuildResult<String> {
    let mut contents = match manifest {
        Some(path) => fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?,
        None => DEFAULT_MANIFEST.to_string(),
    };

    let trimmed_len = contents.trim_end().len();
    contents.truncate(trimmed_len);
    contents.push_str("\r\n");
    if let Some(main_class) = main_class {
        contents.push_str(&format!("Main-Class: {}\r\n", main_class));
    }
    contents.push_str("\r\n");
    Ok(contents)
}

/// Write a jar from a directory.
///
/// Entries are sorted and stamped with a fixed time so identical inputs give
/// byte-identical jars. The manifest is always the first entry.
pub fn write_jar(filesystem: &ProjectFilesystem, params: &JarParams) -> BuildResult<()> {
    let classes_dir = filesystem.resolve(&params.classes_dir);
    let output = filesystem.resolve(&params.output_jar);

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::directory(parent, e))?;
    }

    let manifest = manifest_contents(params.manifest.as_deref(), params.main_class.as_deref())?;
    let options = file_options(params.compression_level);
    let packaging = |e: zip::result::ZipError| BuildError::packaging(&output, e);

    let file = File::create(&output).map_err(|e| BuildError::packaging(&output, e))?;
    let mut jar = ZipWriter::new(file);

    jar.add_directory("META-INF/", options).map_err(packaging)?;
    jar.start_file(MANIFEST_NAME, options).map_err(packaging)?;
    jar.write_all(manifest.as_bytes())
        .map_err(|e| BuildError::packaging(&output, e))?;

    let mut removed = 0usize;
    if classes_dir.is_dir() {
        for entry in WalkDir::new(&classes_dir)
            .min_depth(1)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry.map_err(|e| BuildError::packaging(&output, e))?;
            let relative = entry
                .path()
                .strip_prefix(&classes_dir)
                .map_err(|e| BuildError::packaging(&output, e))?;
            let name = relative.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                if name != "META-INF" {
                    jar.add_directory(format!("{}/", name), options)
                        .map_err(packaging)?;
                }
                continue;
            }
            if name == MANIFEST_NAME {
                continue;
            }
            if params.remove_classes.should_remove_entry(&name) {
                removed += 1;
                continue;
            }

            jar.start_file(name.as_str(), options).map_err(packaging)?;
            let mut source =
                File::open(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
            io::copy(&mut source, &mut jar).map_err(|e| BuildError::packaging(&output, e))?;
        }
    }

    jar.finish().map_err(packaging)?;
    debug!(
        "Packaged {} into {} ({} classes removed)",
        classes_dir.display(),
        output.display(),
        removed
    );
    Ok(())
}
