//! Schema registry capability
//!
//! Consumers ask a [`SchemaRegistry`] for the schema of a format version.
//! [`BuiltinSchemas`] ships the definitions compiled into this crate and can
//! be extended with definitions read from directories.

use crate::error::{SchemaError, XmlError};
use crate::schema::Schema;
use crate::version::compare_versions;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const BUILTIN: &[(&str, &str)] = &[
    ("0.31.yaml", include_str!("../schemas/0.31.yaml")),
    ("0.34.yaml", include_str!("../schemas/0.34.yaml")),
];

/// Source of schemas keyed by format version
pub trait SchemaRegistry: Send + Sync {
    /// Schema for exactly this version
    fn load(&self, version: &str) -> Option<Arc<Schema>>;

    /// Schema of the newest registered version
    fn latest(&self) -> Option<Arc<Schema>>;

    /// Registered versions, oldest first
    fn versions(&self) -> Vec<String>;
}

/// Schema chosen for a document
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    /// The schema to validate against
    pub schema: Arc<Schema>,
    /// Document version has no schema of its own
    pub develop: bool,
}

/// Pick the schema for `version`
///
/// Without a registered schema the document is a develop version: it is only
/// accepted when `allow_develop` is set, and then the newest schema stands in.
///
/// # Errors
/// [`XmlError::UnknownVersion`] if the version is unknown and develop
/// versions are not allowed (or nothing is registered)
pub fn resolve_schema(
    registry: &dyn SchemaRegistry,
    version: &str,
    allow_develop: bool,
) -> Result<ResolvedSchema, XmlError> {
    if let Some(schema) = registry.load(version) {
        return Ok(ResolvedSchema {
            schema,
            develop: false,
        });
    }
    let unknown = || XmlError::UnknownVersion {
        version: version.to_string(),
        known: registry.versions().join(", "),
    };
    if !allow_develop {
        return Err(unknown());
    }
    let schema = registry.latest().ok_or_else(unknown)?;
    tracing::warn!(
        version,
        schema = schema.version(),
        "no schema for input version, using newest schema"
    );
    Ok(ResolvedSchema {
        schema,
        develop: true,
    })
}

/// Registry of compiled-in schemas plus any registered at runtime
#[derive(Debug, Clone)]
pub struct BuiltinSchemas {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl BuiltinSchemas {
    /// Registry holding the compiled-in schemas
    ///
    /// # Errors
    /// [`SchemaError`] if a compiled-in definition is broken
    pub fn new() -> Result<Self, SchemaError> {
        let mut registry = Self {
            schemas: BTreeMap::new(),
        };
        for (origin, text) in BUILTIN {
            registry.register(Schema::from_yaml(origin, text)?);
        }
        Ok(registry)
    }

    /// Compiled-in schemas plus every `*.yaml` file in `dirs`
    ///
    /// Later definitions replace earlier ones of the same version.
    ///
    /// # Errors
    /// [`SchemaError::Io`] if a directory cannot be read, or a decode error
    pub fn with_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<Self, SchemaError> {
        let mut registry = Self::new()?;
        for dir in dirs {
            registry.load_dir(dir.as_ref())?;
        }
        Ok(registry)
    }

    /// Register every `*.yaml` schema in a directory
    ///
    /// # Errors
    /// [`SchemaError::Io`] or a decode error
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, SchemaError> {
        let io = |source| SchemaError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(io)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()
            .map_err(io)?;
        paths.retain(|p| p.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"));
        paths.sort();

        for path in &paths {
            let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
                path: path.clone(),
                source,
            })?;
            self.register(Schema::from_yaml(&path.display().to_string(), &text)?);
        }
        tracing::debug!(dir = %dir.display(), count = paths.len(), "registered schema definitions");
        Ok(paths.len())
    }

    /// Register one schema
    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.version().to_string(), Arc::new(schema));
    }
}

impl SchemaRegistry for BuiltinSchemas {
    fn load(&self, version: &str) -> Option<Arc<Schema>> {
        self.schemas.get(version).cloned()
    }

    fn latest(&self) -> Option<Arc<Schema>> {
        self.schemas
            .values()
            .max_by(|a, b| compare_versions(a.version(), b.version()))
            .cloned()
    }

    fn versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.schemas.keys().cloned().collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        versions
    }
}
