//! Content-addressed artifact store with provenance records
//!
//! Stores artifacts by their content hash, giving:
//! - Write-once semantics (re-inserting identical content is a no-op)
//! - Type-checked retrieval by hash
//! - Provenance records linking an output artifact to the named inputs of the
//!   process that produced it, which doubles as a lookup cache
//!
//! Provenance is write-once per output: the first record naming an artifact as
//! its output stays, so an artifact's history can never be rewritten.

use crate::artifact::{Artifact, ArtifactType, NodeRef};
use crate::hash::{ContentHash, HashError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

struct StoredNode {
    type_id: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

/// One provenance record: `process(inputs) -> output`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Name of the producing process
    pub process: String,
    /// Input link label -> input artifact
    pub inputs: BTreeMap<String, ContentHash>,
    /// Produced artifact
    pub output: ContentHash,
}

/// Content-addressed store
///
/// Safe to share between threads: every table is a `DashMap` and stored
/// artifacts are immutable.
#[derive(Default)]
pub struct ArtifactStore {
    nodes: DashMap<ContentHash, StoredNode>,
    /// record key -> first output recorded under it
    outputs: DashMap<ContentHash, ContentHash>,
    /// output -> the record that produced it
    produced_by: DashMap<ContentHash, ProvenanceRecord>,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("nodes", &self.nodes.len())
            .field("records", &self.produced_by.len())
            .finish()
    }
}

impl ArtifactStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an artifact, returning its hash
    ///
    /// Identical content is stored once; the earlier copy is kept.
    ///
    /// # Errors
    /// [`StoreError::TypeMismatch`] if the hash is already taken by another type
    pub fn insert<T: ArtifactType>(&self, artifact: Artifact<T>) -> Result<ContentHash, StoreError> {
        let hash = *artifact.hash();
        let entry = self.nodes.entry(hash).or_insert_with(|| {
            tracing::debug!(hash = %hash.short(), type_id = T::TYPE_ID, "storing artifact");
            StoredNode {
                type_id: T::TYPE_ID,
                payload: Arc::new(artifact),
            }
        });
        if entry.type_id != T::TYPE_ID {
            return Err(StoreError::TypeMismatch {
                hash,
                expected: T::TYPE_ID.to_string(),
                actual: entry.type_id.to_string(),
            });
        }
        Ok(hash)
    }

    /// Fetch a typed artifact
    ///
    /// # Errors
    /// [`StoreError::NotFound`] or [`StoreError::TypeMismatch`]
    pub fn get<T: ArtifactType>(&self, hash: &ContentHash) -> Result<Artifact<T>, StoreError> {
        let node = self.nodes.get(hash).ok_or(StoreError::NotFound(*hash))?;
        node.payload
            .downcast_ref::<Artifact<T>>()
            .cloned()
            .ok_or_else(|| StoreError::TypeMismatch {
                hash: *hash,
                expected: T::TYPE_ID.to_string(),
                actual: node.type_id.to_string(),
            })
    }

    /// Whether a node with this hash exists
    #[inline]
    #[must_use]
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Number of stored nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All stored nodes, sorted by hash
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeRef> {
        let mut refs: Vec<NodeRef> = self
            .nodes
            .iter()
            .map(|entry| NodeRef {
                hash: *entry.key(),
                type_id: entry.value().type_id,
            })
            .collect();
        refs.sort();
        refs
    }

    /// Record that `process(inputs)` produced `output`
    ///
    /// Returns the record key. Every input and the output must already be
    /// stored. An output keeps the first record naming it; recording another
    /// producer for it later is a no-op.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for a missing node, [`StoreError::SelfReference`]
    /// if the output is one of the inputs, [`StoreError::Hash`] if the record
    /// key cannot be computed
    pub fn record(
        &self,
        process: &str,
        inputs: BTreeMap<String, ContentHash>,
        output: ContentHash,
    ) -> Result<ContentHash, StoreError> {
        for hash in inputs.values().chain(std::iter::once(&output)) {
            if !self.contains(hash) {
                return Err(StoreError::NotFound(*hash));
            }
        }
        if let Some((link, _)) = inputs.iter().find(|(_, hash)| **hash == output) {
            return Err(StoreError::SelfReference {
                output,
                link: link.clone(),
            });
        }
        let key = Self::record_key(process, &inputs)?;
        self.outputs.entry(key).or_insert(output);
        let record = self.produced_by.entry(output).or_insert_with(|| ProvenanceRecord {
            process: process.to_string(),
            inputs,
            output,
        });
        if Self::record_key(&record.process, &record.inputs)? != key {
            tracing::debug!(output = %output.short(), "output already has a producer, keeping it");
        }
        Ok(key)
    }

    /// Output of an earlier identical `process(inputs)` call, if any
    #[must_use]
    pub fn lookup(&self, process: &str, inputs: &BTreeMap<String, ContentHash>) -> Option<ContentHash> {
        let key = Self::record_key(process, inputs).ok()?;
        self.outputs.get(&key).map(|output| *output)
    }

    /// The record that produced `output`, if it was produced by a process
    #[must_use]
    pub fn provenance_of(&self, output: &ContentHash) -> Option<ProvenanceRecord> {
        self.produced_by.get(output).map(|record| record.clone())
    }

    /// Named inputs of the process that produced `output`
    #[must_use]
    pub fn inputs_of(&self, output: &ContentHash) -> Option<BTreeMap<String, ContentHash>> {
        self.provenance_of(output).map(|record| record.inputs)
    }

    /// Key of the record `process(inputs)`, known before anything is stored
    ///
    /// # Errors
    /// [`StoreError::Hash`] if the inputs cannot be serialized
    pub fn record_key(
        process: &str,
        inputs: &BTreeMap<String, ContentHash>,
    ) -> Result<ContentHash, StoreError> {
        Ok(ContentHash::compute_serializable(&(process, inputs))?)
    }
}

/// Errors raised by the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No node with this hash
    #[error("no stored node with hash {0}")]
    NotFound(ContentHash),

    /// Node exists with a different artifact type
    #[error("node {hash} has type '{actual}', expected '{expected}'")]
    TypeMismatch {
        hash: ContentHash,
        expected: String,
        actual: String,
    },

    /// A record would name its output as one of its inputs
    #[error("node {output} cannot be its own input '{link}'")]
    SelfReference { output: ContentHash, link: String },

    /// Record key could not be computed
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::private;

    #[derive(Debug, Clone)]
    struct TextArtifact;

    #[derive(Debug, Clone, PartialEq)]
    struct TextContent(String);

    impl private::Sealed for TextArtifact {}

    impl ArtifactType for TextArtifact {
        type Content = TextContent;

        fn hash(content: &Self::Content) -> ContentHash {
            ContentHash::compute(content.0.as_bytes())
        }

        const TYPE_ID: &'static str = "text";
    }

    #[derive(Debug, Clone)]
    struct OtherArtifact;

    impl private::Sealed for OtherArtifact {}

    impl ArtifactType for OtherArtifact {
        type Content = TextContent;

        fn hash(content: &Self::Content) -> ContentHash {
            ContentHash::compute(content.0.as_bytes())
        }

        const TYPE_ID: &'static str = "other";
    }

    fn text(s: &str) -> Artifact<TextArtifact> {
        Artifact::new(TextContent(s.to_string())).unwrap()
    }

    #[test]
    fn insert_is_write_once() {
        let store = ArtifactStore::new();
        let h1 = store.insert(text("a")).unwrap();
        let h2 = store.insert(text("a")).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_returns_typed_clone() {
        let store = ArtifactStore::new();
        let hash = store.insert(text("payload")).unwrap();
        let back = store.get::<TextArtifact>(&hash).unwrap();
        assert_eq!(back.content().0, "payload");
    }

    #[test]
    fn get_with_wrong_type_fails() {
        let store = ArtifactStore::new();
        let hash = store.insert(text("payload")).unwrap();
        let result = store.get::<OtherArtifact>(&hash);
        assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
    }

    #[test]
    fn insert_collision_with_other_type_fails() {
        let store = ArtifactStore::new();
        store.insert(text("same")).unwrap();
        let other = Artifact::<OtherArtifact>::new(TextContent("same".to_string())).unwrap();
        assert!(matches!(store.insert(other), Err(StoreError::TypeMismatch { .. })));
    }

    #[test]
    fn missing_node_is_not_found() {
        let store = ArtifactStore::new();
        let result = store.get::<TextArtifact>(&ContentHash::compute(b"nope"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn records_link_inputs_to_output() {
        let store = ArtifactStore::new();
        let original = store.insert(text("original")).unwrap();
        let output = store.insert(text("output")).unwrap();
        let inputs = BTreeMap::from([("original".to_string(), original)]);

        store.record("modify", inputs.clone(), output).unwrap();

        assert_eq!(store.lookup("modify", &inputs), Some(output));
        assert_eq!(store.lookup("other", &inputs), None);
        let record = store.provenance_of(&output).unwrap();
        assert_eq!(record.inputs["original"], original);
        assert_eq!(record.process, "modify");
    }

    #[test]
    fn first_producer_of_an_output_is_kept() {
        let store = ArtifactStore::new();
        let first = store.insert(text("first")).unwrap();
        let second = store.insert(text("second")).unwrap();
        let output = store.insert(text("output")).unwrap();
        let by_first = BTreeMap::from([("original".to_string(), first)]);
        let by_second = BTreeMap::from([("original".to_string(), second)]);

        store.record("modify", by_first.clone(), output).unwrap();
        store.record("modify", by_second.clone(), output).unwrap();

        assert_eq!(store.inputs_of(&output).unwrap(), by_first);
        assert_eq!(store.lookup("modify", &by_second), Some(output));
    }

    #[test]
    fn outputs_cannot_be_their_own_inputs() {
        let store = ArtifactStore::new();
        let original = store.insert(text("original")).unwrap();
        let edited = store.insert(text("edited")).unwrap();
        store
            .record("modify", BTreeMap::from([("original".to_string(), original)]), edited)
            .unwrap();

        let looping = BTreeMap::from([("original".to_string(), edited)]);
        assert!(matches!(
            store.record("modify", looping.clone(), edited),
            Err(StoreError::SelfReference { ref link, .. }) if link == "original"
        ));
        assert_eq!(store.inputs_of(&edited).unwrap()["original"], original);
        assert_eq!(store.lookup("modify", &looping), None);
    }

    #[test]
    fn record_requires_stored_nodes() {
        let store = ArtifactStore::new();
        let output = store.insert(text("output")).unwrap();
        let inputs = BTreeMap::from([("original".to_string(), ContentHash::compute(b"ghost"))]);
        assert!(matches!(
            store.record("modify", inputs, output),
            Err(StoreError::NotFound(_))
        ));
    }
}
