//! Project filesystem layout and target-derived output paths

use crate::target::BuildTarget;
use std::path::{Path, PathBuf};

/// Default name of the build output directory
pub const DEFAULT_BUCK_OUT: &str = "buck-out";

/// Project root plus the layout of the build output tree.
///
/// All paths handed out by this type are relative to the project root unless
/// the method name says otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFilesystem {
    root: PathBuf,
    buck_out: PathBuf,
}

impl ProjectFilesystem {
    /// Create a filesystem rooted at `root` with the default output directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            buck_out: PathBuf::from(DEFAULT_BUCK_OUT),
        }
    }

    /// Set the output directory (relative to the root)
    pub fn with_buck_out(mut self, buck_out: impl Into<PathBuf>) -> Self {
        self.buck_out = buck_out.into();
        self
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Output directory, relative to the root
    pub fn buck_out(&self) -> &Path {
        &self.buck_out
    }

    /// Resolve a root-relative path to an absolute one
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Make a path relative to the root if it lives under it
    pub fn relativize(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// `buck-out/gen/<base>/<format>` with `%s` replaced by the target name
    pub fn gen_path(&self, target: &BuildTarget, format: &str) -> PathBuf {
        self.scoped_path("gen", target, format)
    }

    /// `buck-out/bin/<base>/<format>` with `%s` replaced by the target name
    pub fn bin_path(&self, target: &BuildTarget, format: &str) -> PathBuf {
        self.scoped_path("bin", target, format)
    }

    /// `buck-out/annotation/<base>/<format>` with `%s` replaced by the target name
    pub fn annotation_path(&self, target: &BuildTarget, format: &str) -> PathBuf {
        self.scoped_path("annotation", target, format)
    }

    fn scoped_path(&self, scope: &str, target: &BuildTarget, format: &str) -> PathBuf {
        let mut path = self.buck_out.join(scope);
        if !target.base_path.is_empty() {
            path.push(&target.base_path);
        }
        path.join(format.replace("%s", &target.short_name_and_flavor_postfix()))
    }
}
