//! Error types for the XML document layer
//!
//! - [`XmlError`]: loading, querying and serializing input documents
//! - [`SchemaError`]: loading schema definitions
//! - [`ValidationDiagnostic`]: one schema violation found in a tree

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Errors raised while handling input documents
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// Document is not well-formed XML
    #[error("malformed XML in {file}: {message}")]
    Malformed { file: String, message: String },

    /// A required file is absent from the file set
    #[error("file '{0}' is not part of the file set")]
    MissingFile(String),

    /// No `fleurInputVersion` marker could be found
    #[error("no fleurInputVersion marker found in {0}")]
    VersionNotFound(String),

    /// Version has no registered schema and develop versions are not allowed
    #[error("no schema registered for input version '{version}' (known: {known})")]
    UnknownVersion { version: String, known: String },

    /// Path expression could not be parsed
    #[error("invalid path expression '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Tree could not be written back to bytes
    #[error("failed to serialize {file}: {message}")]
    Serialize { file: String, message: String },
}

impl XmlError {
    /// Create a path parse error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading schema definitions
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// YAML could not be decoded
    #[error("invalid schema definition {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Schema directory or file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Schema contents are inconsistent
    #[error("inconsistent schema {version}: {message}")]
    Inconsistent { version: String, message: String },
}

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDiagnostic {
    /// Name path of the offending element (`/fleurInput/calculationSetup/scfLoop`)
    pub path: String,
    /// What is wrong
    pub message: String,
}

impl ValidationDiagnostic {
    /// Diagnostic for the element at `path`
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl Display for ValidationDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
