//! Source path references and their resolution to filesystem paths

use crate::filesystem::ProjectFilesystem;
use crate::target::BuildTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A reference to a file consumed by a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourcePath {
    /// A file checked into the project, relative to the project root
    Path(PathBuf),
    /// A file produced by another rule, relative to the project root
    BuildTargetOutput { target: BuildTarget, path: PathBuf },
}

impl SourcePath {
    /// Reference a project file
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Reference the output of a rule
    pub fn output_of(target: BuildTarget, path: impl Into<PathBuf>) -> Self {
        Self::BuildTargetOutput {
            target,
            path: path.into(),
        }
    }

    /// The producing rule, if this path is generated
    pub fn rule_target(&self) -> Option<&BuildTarget> {
        match self {
            Self::Path(_) => None,
            Self::BuildTargetOutput { target, .. } => Some(target),
        }
    }

    fn unresolved(&self) -> &Path {
        match self {
            Self::Path(path) => path,
            Self::BuildTargetOutput { path, .. } => path,
        }
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::BuildTargetOutput { target, path } => {
                write!(f, "{} ({})", target, path.display())
            }
        }
    }
}

/// Resolves source path references; deterministic and total over declared inputs
pub trait SourcePathResolver {
    /// Absolute filesystem path
    fn absolute_path(&self, source: &SourcePath) -> PathBuf;

    /// Path relative to the project root
    fn relative_path(&self, source: &SourcePath) -> PathBuf;
}

/// Resolver backed by a project filesystem
#[derive(Debug, Clone)]
pub struct DefaultSourcePathResolver {
    filesystem: ProjectFilesystem,
}

impl DefaultSourcePathResolver {
    pub fn new(filesystem: ProjectFilesystem) -> Self {
        Self { filesystem }
    }
}

impl SourcePathResolver for DefaultSourcePathResolver {
    fn absolute_path(&self, source: &SourcePath) -> PathBuf {
        self.filesystem.resolve(source.unresolved())
    }

    fn relative_path(&self, source: &SourcePath) -> PathBuf {
        self.filesystem.relativize(source.unresolved())
    }
}
