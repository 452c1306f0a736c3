//! Error types for input modification
//!
//! Every fatal condition of a modification run maps to one variant:
//! - invalid or unloadable input decks
//! - task names without a handler
//! - edits whose target does not exist
//! - malformed task arguments
//! - schema violations of the result

use fleurinp_artifact::{ArtifactError, StoreError};
use fleurinp_xml::{SchemaError, ValidationDiagnostic, XmlError};
use std::path::PathBuf;

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, FleurinpError>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum FleurinpError {
    /// Primary file missing, unparseable, or of an unresolvable version
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Task name without a handler
    #[error("unknown modification task '{name}'")]
    UnknownOperation { name: String },

    /// Edit target does not exist
    #[error("no element matches '{path}'")]
    PathNotFound { path: String },

    /// Task arguments are malformed
    #[error("invalid task arguments: {0}")]
    Argument(String),

    /// Result of the edits violates the schema
    #[error("input file does not validate against schema {version}: {}", summarize(.diagnostics))]
    Validation {
        version: String,
        diagnostics: Vec<ValidationDiagnostic>,
    },

    /// A task references an auxiliary node that was never registered
    #[error("no auxiliary node registered under '{0}'")]
    MissingNode(String),

    /// Artifact store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Artifact construction failure
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Document handling failure
    #[error("xml error: {0}")]
    Xml(#[from] XmlError),

    /// Schema definitions could not be loaded
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Task list (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be read
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FleurinpError {
    /// Wrap a load failure as [`FleurinpError::InvalidInput`]
    pub fn invalid_input(err: impl std::fmt::Display) -> Self {
        Self::InvalidInput(err.to_string())
    }

    /// Create an argument error
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Create a path-not-found error
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    /// Create an io error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn summarize(diagnostics: &[ValidationDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_operation_names_the_task() {
        let err = FleurinpError::UnknownOperation {
            name: "doesNotExist".to_string(),
        };
        assert_eq!(err.to_string(), "unknown modification task 'doesNotExist'");
    }

    #[test]
    fn load_failures_become_invalid_input() {
        let err = FleurinpError::invalid_input(XmlError::MissingFile("inp.xml".to_string()));
        assert!(matches!(err, FleurinpError::InvalidInput(ref m) if m.contains("inp.xml")));
    }
}
