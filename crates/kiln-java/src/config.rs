//! JVM build configuration
//!
//! Read from the `[java]` table of a project's `kiln.toml`:
//!
//! ```toml
//! [java]
//! buck_out = "buck-out"
//! track_class_usage = true
//! src_roots = ["/java/", "/javatests/", "src"]
//! remove_classes = ["^com\\.example\\.BuildConfig$"]
//! compression_level = 6
//! ```

use crate::error::{BuildError, BuildResult};
use crate::filesystem::{ProjectFilesystem, DEFAULT_BUCK_OUT};
use crate::package_finder::DefaultJavaPackageFinder;
use crate::step::jar::{RemoveClassesPatternsMatcher, DEFAULT_COMPRESSION_LEVEL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings shared by every JVM library in a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JavaConfig {
    /// Build output directory, relative to the project root
    #[serde(default = "default_buck_out")]
    pub buck_out: PathBuf,
    /// Write class usage dependency files for incremental rebuilds
    #[serde(default = "default_true")]
    pub track_class_usage: bool,
    /// Source roots: a leading `/` anchors at the project root, otherwise the
    /// entry names a directory that acts as a root wherever it appears
    #[serde(default = "default_src_roots")]
    pub src_roots: Vec<String>,
    /// Patterns of class names removed from every jar
    #[serde(default)]
    pub remove_classes: Vec<String>,
    /// Jar compression level, 0 (store) to 9
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_buck_out() -> PathBuf {
    PathBuf::from(DEFAULT_BUCK_OUT)
}

fn default_true() -> bool {
    true
}

fn default_src_roots() -> Vec<String> {
    vec!["/java/".to_string(), "/javatests/".to_string(), "src".to_string()]
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            buck_out: default_buck_out(),
            track_class_usage: true,
            src_roots: default_src_roots(),
            remove_classes: Vec::new(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    java: Option<JavaConfig>,
}

impl JavaConfig {
    /// Parse the `[java]` table of a TOML document; a missing table gives defaults
    pub fn from_toml_str(source: &str) -> BuildResult<Self> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| BuildError::ConfigError(e.to_string()))?;
        let config = file.java.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn from_file(path: &Path) -> BuildResult<Self> {
        let source = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Self::from_toml_str(&source)
    }

    /// Check value ranges and patterns
    pub fn validate(&self) -> BuildResult<()> {
        if !(0..=9).contains(&self.compression_level) {
            return Err(BuildError::ConfigError(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        if self.buck_out.as_os_str().is_empty() || self.buck_out.is_absolute() {
            return Err(BuildError::ConfigError(format!(
                "buck_out must be a relative path, got '{}'",
                self.buck_out.display()
            )));
        }
        self.remove_classes_matcher()?;
        Ok(())
    }

    /// Filesystem layout rooted at `root`
    pub fn filesystem(&self, root: impl Into<PathBuf>) -> ProjectFilesystem {
        ProjectFilesystem::new(root).with_buck_out(&self.buck_out)
    }

    /// Package finder over the configured source roots
    pub fn package_finder(&self) -> DefaultJavaPackageFinder {
        DefaultJavaPackageFinder::from_src_roots(&self.src_roots)
    }

    /// Matcher for the configured class removal patterns
    pub fn remove_classes_matcher(&self) -> BuildResult<RemoveClassesPatternsMatcher> {
        RemoveClassesPatternsMatcher::compile(&self.remove_classes)
    }
}
