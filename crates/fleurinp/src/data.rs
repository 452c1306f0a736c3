//! FLEUR input decks as immutable artifacts
//!
//! [`FleurinpData`] is a named file set with one primary file (`inp.xml`).
//! Its version and parsed dict are derived from the primary file whenever the
//! data is built, so they can never disagree with the files. Stored decks are
//! [`Artifact<FleurinpArtifact>`] values; edits go through [`FleurinpBuilder`]
//! and always produce a new deck.
//!
//! A stored deck is identified by its file tree, its label and description,
//! and the provenance record it was materialized by, if any. Two decks with
//! equal files but different histories are different artifacts.

use crate::error::{FleurinpError, Result};
use fleurinp_artifact::{
    Artifact, ArtifactError, ArtifactType, ContentHash, FileSetTree, __private::Sealed,
};
use fleurinp_xml::{
    extract_version, inline_includes, parse_file, parsed_dict, resolve_schema, Element, IncludeMap,
    Schema, SchemaRegistry,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Name of the primary file
pub const INP_XML: &str = "inp.xml";

/// Name of the density matrix side channel file
pub const NMMP_MAT: &str = "n_mmp_mat";

/// An input deck: named files plus attributes derived from `inp.xml`
#[derive(Debug, Clone, PartialEq)]
pub struct FleurinpData {
    files: BTreeMap<String, Vec<u8>>,
    inp_version: String,
    parsed_dict: Value,
    label: String,
    description: String,
    origin: Option<ContentHash>,
}

impl FleurinpData {
    /// Build from a file set
    ///
    /// # Errors
    /// [`FleurinpError::InvalidInput`] if `inp.xml` is missing, malformed or
    /// carries no version marker
    pub fn new<I, N, B>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, B)>,
        N: Into<String>,
        B: Into<Vec<u8>>,
    {
        let mut builder = FleurinpBuilder::new();
        for (name, bytes) in files {
            builder.set_file(name, bytes);
        }
        builder.build()
    }

    /// Build from every regular file in a directory
    ///
    /// # Errors
    /// [`FleurinpError::Io`] or [`FleurinpError::InvalidInput`]
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut builder = FleurinpBuilder::new();
        let entries = std::fs::read_dir(dir).map_err(|e| FleurinpError::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| FleurinpError::io(dir, e))?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let bytes = std::fs::read(&path).map_err(|e| FleurinpError::io(&path, e))?;
            builder.set_file(name, bytes);
        }
        builder.build()
    }

    /// Write every file into a directory (created if needed)
    ///
    /// # Errors
    /// [`FleurinpError::Io`]
    pub fn export_to_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| FleurinpError::io(dir, e))?;
        for (name, bytes) in &self.files {
            let path = dir.join(name);
            std::fs::write(&path, bytes).map_err(|e| FleurinpError::io(&path, e))?;
        }
        Ok(())
    }

    /// All files by name
    #[inline]
    #[must_use]
    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    /// File names, sorted
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Contents of one file
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Format version declared by `inp.xml`
    #[inline]
    #[must_use]
    pub fn inp_version(&self) -> &str {
        &self.inp_version
    }

    /// Typed view of `inp.xml` with includes resolved
    #[inline]
    #[must_use]
    pub fn parsed_dict(&self) -> &Value {
        &self.parsed_dict
    }

    /// Free-form label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Free-form description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether a density matrix file is part of the deck
    #[inline]
    #[must_use]
    pub fn has_nmmpmat(&self) -> bool {
        self.files.contains_key(NMMP_MAT)
    }

    /// Key of the provenance record this deck was materialized by
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<&ContentHash> {
        self.origin.as_ref()
    }

    /// Builder seeded with this deck's files and metadata
    ///
    /// The origin is not carried over; whatever is built from the builder is
    /// a deck of its own.
    #[must_use]
    pub fn to_builder(&self) -> FleurinpBuilder {
        FleurinpBuilder {
            files: self.files.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
            origin: None,
        }
    }

    /// Merkle root over the files
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        FileSetTree::from_files(self.files.iter().map(|(n, b)| (n.as_str(), b.as_slice()))).root()
    }

    /// Stored identity: file tree, metadata and origin
    #[must_use]
    pub fn identity(&self) -> ContentHash {
        let files = self.content_hash();
        let origin = self.origin.as_ref().map_or(&[][..], |hash| hash.as_bytes().as_slice());
        ContentHash::compute_fields(&[
            files.as_bytes().as_slice(),
            self.label.as_bytes(),
            self.description.as_bytes(),
            origin,
        ])
    }

    /// Parse `inp.xml`, inline its includes and pick its schema
    ///
    /// # Errors
    /// [`FleurinpError::InvalidInput`] if a file does not parse, or if the
    /// version has no schema and `allow_develop` is not set
    pub fn load_xml(&self, registry: &dyn SchemaRegistry, allow_develop: bool) -> Result<LoadedInput> {
        let mut tree = parse_file(&self.files, INP_XML).map_err(FleurinpError::invalid_input)?;
        let includes = inline_includes(&mut tree, &self.files).map_err(FleurinpError::invalid_input)?;
        let resolved = resolve_schema(registry, &self.inp_version, allow_develop)
            .map_err(FleurinpError::invalid_input)?;
        Ok(LoadedInput {
            tree,
            schema: resolved.schema,
            includes,
            develop: resolved.develop,
        })
    }
}

/// A deck loaded for editing
#[derive(Debug, Clone)]
pub struct LoadedInput {
    /// Combined tree with includes inlined
    pub tree: Element,
    /// Schema chosen for the deck's version
    pub schema: Arc<Schema>,
    /// Where included files were inlined
    pub includes: IncludeMap,
    /// Version has no schema of its own
    pub develop: bool,
}

/// Mutable, unstored deck state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleurinpBuilder {
    files: BTreeMap<String, Vec<u8>>,
    label: String,
    description: String,
    origin: Option<ContentHash>,
}

impl FleurinpBuilder {
    /// Empty builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn set_file(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(name.into(), bytes.into());
        self
    }

    /// Remove a file
    ///
    /// Removing a file that is not present is a no-op.
    ///
    /// # Errors
    /// [`FleurinpError::InvalidInput`] for the primary file
    pub fn del_file(&mut self, name: &str) -> Result<&mut Self> {
        if name == INP_XML {
            return Err(FleurinpError::InvalidInput(format!(
                "{INP_XML} is the primary file and cannot be removed"
            )));
        }
        if self.files.remove(name).is_none() {
            tracing::debug!(file = name, "file to remove is not part of the deck");
        }
        Ok(self)
    }

    /// Whether a file is present
    #[must_use]
    pub fn has_file(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Contents of one file
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Set the label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the key of the provenance record producing the deck
    #[must_use]
    pub fn with_origin(mut self, origin: ContentHash) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Derive version and parsed dict from `inp.xml` and freeze the files
    ///
    /// # Errors
    /// [`FleurinpError::InvalidInput`] if `inp.xml` is missing, malformed or
    /// has no version marker
    pub fn build(self) -> Result<FleurinpData> {
        let primary = self.files.get(INP_XML).ok_or_else(|| {
            FleurinpError::InvalidInput(format!("{INP_XML} is not part of the file set"))
        })?;
        let inp_version = extract_version(INP_XML, primary).map_err(FleurinpError::invalid_input)?;
        let mut tree = parse_file(&self.files, INP_XML).map_err(FleurinpError::invalid_input)?;
        inline_includes(&mut tree, &self.files).map_err(FleurinpError::invalid_input)?;
        Ok(FleurinpData {
            parsed_dict: parsed_dict(&tree),
            files: self.files,
            inp_version,
            label: self.label,
            description: self.description,
            origin: self.origin,
        })
    }
}

/// Artifact type of stored input decks
#[derive(Debug, Clone)]
pub struct FleurinpArtifact;

impl Sealed for FleurinpArtifact {}

impl ArtifactType for FleurinpArtifact {
    type Content = FleurinpData;

    fn hash(content: &Self::Content) -> ContentHash {
        content.identity()
    }

    const TYPE_ID: &'static str = "fleur.fleurinp";

    fn validate_content(content: &Self::Content) -> std::result::Result<(), ArtifactError> {
        if !content.files.contains_key(INP_XML) {
            return Err(ArtifactError::InvariantViolation(format!("{INP_XML} missing")));
        }
        if content.inp_version.is_empty() {
            return Err(ArtifactError::InvariantViolation(
                "input version not resolved".to_string(),
            ));
        }
        Ok(())
    }
}

impl FleurinpData {
    /// Wrap as an artifact ready for storing
    ///
    /// # Errors
    /// [`FleurinpError::Artifact`] if the content invariants do not hold
    pub fn into_artifact(self) -> Result<Artifact<FleurinpArtifact>> {
        Ok(Artifact::new(self)?)
    }
}
