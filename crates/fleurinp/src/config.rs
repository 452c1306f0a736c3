//! Modification settings

use crate::error::{FleurinpError, Result};
use fleurinp_xml::{BuiltinSchemas, SchemaRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings for edit sessions and materialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierConfig {
    /// Accept input versions without a registered schema
    ///
    /// Such decks are checked against the newest schema at load time only;
    /// validation after edits is skipped with a warning.
    pub allow_develop_versions: bool,
    /// Whether `show` validates the previewed tree
    pub validate_preview: bool,
    /// Reuse a stored result for an identical original and task list
    pub use_cache: bool,
    /// Extra directories of `*.yaml` schema definitions
    pub schema_dirs: Vec<PathBuf>,
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            allow_develop_versions: false,
            validate_preview: true,
            use_cache: false,
            schema_dirs: Vec::new(),
        }
    }
}

impl ModifierConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With develop versions allowed
    #[inline]
    #[must_use]
    pub fn with_develop_versions(mut self, allow: bool) -> Self {
        self.allow_develop_versions = allow;
        self
    }

    /// With preview validation switched on or off
    #[inline]
    #[must_use]
    pub fn with_validate_preview(mut self, validate: bool) -> Self {
        self.validate_preview = validate;
        self
    }

    /// With cache reuse switched on or off
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// With an extra schema directory
    #[must_use]
    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dirs.push(dir.into());
        self
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// [`FleurinpError::Config`] on malformed TOML or unknown value types
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FleurinpError::Config(e.to_string()))
    }

    /// Read from a TOML file
    ///
    /// # Errors
    /// [`FleurinpError::Io`] or [`FleurinpError::Config`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| FleurinpError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Schema registry for this configuration
    ///
    /// # Errors
    /// [`FleurinpError::Schema`] if a schema directory cannot be loaded
    pub fn schema_registry(&self) -> Result<Arc<dyn SchemaRegistry>> {
        Ok(Arc::new(BuiltinSchemas::with_dirs(&self.schema_dirs)?))
    }
}
