/// Build planning and step execution error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to prepare directory {path}: {error}")]
    DirectoryPreparation {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Compilation failed for target '{target}': {diagnostics}")]
    Compilation { target: String, diagnostics: String },

    #[error("Failed to package archive {path}: {error}")]
    Packaging { path: PathBuf, error: String },

    #[error("Corrupt build metadata in {path} at line {line}: {reason}")]
    CorruptMetadata {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Rule '{rule}' declares ABI jar '{abi_target}' but no ABI artifact is available")]
    MissingAbiArtifact { rule: String, abi_target: String },

    #[error("No rule registered for target: {target}")]
    RuleNotFound { target: String },

    #[error("Artifact recorded more than once: {path}")]
    DuplicateArtifact { path: PathBuf },

    #[error("Invalid compile request for target '{target}': {reason}")]
    InvalidRequest { target: String, reason: String },

    #[error("Invalid build target '{0}'")]
    InvalidTarget(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Post-process command '{command}' failed: {status}")]
    PostProcess { command: String, status: String },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Create a directory preparation error
    pub fn directory(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::DirectoryPreparation {
            path: path.into(),
            error,
        }
    }

    /// Create a compilation error carrying compiler diagnostics
    pub fn compilation(target: impl ToString, diagnostics: impl Into<String>) -> Self {
        Self::Compilation {
            target: target.to_string(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Create a packaging error
    pub fn packaging(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::Packaging {
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// Create a corrupt metadata error for a 1-based line number
    pub fn corrupt_metadata(
        path: impl Into<PathBuf>,
        line: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::CorruptMetadata {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Create a missing ABI artifact error
    pub fn missing_abi_artifact(rule: impl ToString, abi_target: impl ToString) -> Self {
        Self::MissingAbiArtifact {
            rule: rule.to_string(),
            abi_target: abi_target.to_string(),
        }
    }

    /// Create a rule not found error
    pub fn rule_not_found(target: impl ToString) -> Self {
        Self::RuleNotFound {
            target: target.to_string(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(target: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Whether a caller may degrade this error to "no prior state"
    pub fn is_corrupt_metadata(&self) -> bool {
        matches!(self, Self::CorruptMetadata { .. })
    }
}
