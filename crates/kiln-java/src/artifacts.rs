//! Artifact declaration sink

use crate::error::{BuildError, BuildResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Receives every path a rule produces that downstream caching must know about
pub trait BuildableContext {
    /// Record a produced artifact. Recording the same path twice in one build
    /// is a logic error and must be rejected.
    fn record_artifact(&mut self, path: &Path) -> BuildResult<()>;
}

/// Artifact sink that keeps declarations in the order they were made
#[derive(Debug, Default, Clone)]
pub struct RecordedArtifacts {
    order: Vec<PathBuf>,
    seen: BTreeSet<PathBuf>,
}

impl RecordedArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts in declaration order
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.order
    }

    /// Whether a path has been recorded
    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl BuildableContext for RecordedArtifacts {
    fn record_artifact(&mut self, path: &Path) -> BuildResult<()> {
        if !self.seen.insert(path.to_path_buf()) {
            return Err(BuildError::DuplicateArtifact {
                path: path.to_path_buf(),
            });
        }
        self.order.push(path.to_path_buf());
        Ok(())
    }
}
