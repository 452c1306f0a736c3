//! Edit sessions
//!
//! A [`FleurinpModifier`] is bound to one stored deck. Named builder calls
//! append typed tasks to its queue; nothing touches the deck until
//! [`FleurinpModifier::show`] replays the queue on a throwaway copy or
//! [`FleurinpModifier::freeze`] materializes a new deck. The original is
//! never mutated, so any number of sessions can share it.

use crate::config::ModifierConfig;
use crate::data::{FleurinpArtifact, FleurinpData};
use crate::error::{FleurinpError, Result};
use crate::interpreter::AuxNodes;
use crate::materialize::{apply_queue, load_node, modify_with_task_list, ModifyInputs, Preview};
use crate::queue::ModificationQueue;
use crate::task::{
    AtomGroupEdit, AtomGroupLabelEdit, AttribDelete, AttribEdit, CloneSpecies, ComplexTagEdit, DelFile,
    FileTask, SetFile, SetInpchanges, SetKpointsdata, SetNkpts, SetNmmpmat, ShiftValue,
    ShiftValueSpeciesLabel, SimpleTagEdit, SpeciesEdit, SpeciesLabelEdit, SwitchKpointset, TagCreate,
    TagReplace, TagSelect, Task, TextEdit, XPathAttrib, XPathAttribDelete, XPathCreate, XPathReplace,
    XPathSelect, XPathText, XmlTask,
};
use crate::tasklist::{SerializedTaskList, TaskListArtifact, TaskListData};
use fleurinp_artifact::{Artifact, ArtifactStore, ContentHash};
use fleurinp_xml::SchemaRegistry;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builder methods that append one XML task from its payload
macro_rules! xml_task_methods {
    ($($(#[$doc:meta])* $method:ident($payload:ty) => $variant:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $method(&mut self, task: $payload) -> &mut Self {
                self.add(XmlTask::$variant(task))
            }
        )*
    };
}

/// Edit session on one stored deck
pub struct FleurinpModifier<'s> {
    store: &'s ArtifactStore,
    original: ContentHash,
    data: FleurinpData,
    queue: ModificationQueue,
    nodes: BTreeMap<String, ContentHash>,
    config: ModifierConfig,
    registry: Arc<dyn SchemaRegistry>,
    label: Option<String>,
    description: Option<String>,
}

impl std::fmt::Debug for FleurinpModifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleurinpModifier")
            .field("original", &self.original)
            .field("tasks", &self.queue.len())
            .field("nodes", &self.nodes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'s> FleurinpModifier<'s> {
    /// Session on the deck stored under `original`, with default settings
    ///
    /// # Errors
    /// As [`FleurinpModifier::with_config`]
    pub fn new(store: &'s ArtifactStore, original: ContentHash) -> Result<Self> {
        Self::with_config(store, original, ModifierConfig::default())
    }

    /// Session with explicit settings
    ///
    /// The deck is loaded right away, so an unresolvable version fails here
    /// rather than at materialization.
    ///
    /// # Errors
    /// [`FleurinpError::Store`] if the deck is not stored,
    /// [`FleurinpError::InvalidInput`] if it cannot be loaded
    pub fn with_config(store: &'s ArtifactStore, original: ContentHash, config: ModifierConfig) -> Result<Self> {
        let registry = config.schema_registry()?;
        Self::with_registry(store, original, config, registry)
    }

    /// Session using a caller-provided schema registry
    ///
    /// # Errors
    /// As [`FleurinpModifier::with_config`]
    pub fn with_registry(
        store: &'s ArtifactStore,
        original: ContentHash,
        config: ModifierConfig,
        registry: Arc<dyn SchemaRegistry>,
    ) -> Result<Self> {
        let data = store.get::<FleurinpArtifact>(&original)?.into_content();
        data.load_xml(registry.as_ref(), config.allow_develop_versions)?;
        tracing::debug!(original = %original.short(), version = data.inp_version(), "edit session started");
        Ok(Self {
            store,
            original,
            data,
            queue: ModificationQueue::new(),
            nodes: BTreeMap::new(),
            config,
            registry,
            label: None,
            description: None,
        })
    }

    /// Label of the materialized deck
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Description of the materialized deck
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Hash of the deck being edited
    #[inline]
    #[must_use]
    pub fn original(&self) -> &ContentHash {
        &self.original
    }

    /// The deck being edited
    #[inline]
    #[must_use]
    pub fn data(&self) -> &FleurinpData {
        &self.data
    }

    /// Queued tasks
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &ModificationQueue {
        &self.queue
    }

    /// Session settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ModifierConfig {
        &self.config
    }

    /// Registered side-table entries
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &BTreeMap<String, ContentHash> {
        &self.nodes
    }

    /// Append a typed task
    pub fn add(&mut self, task: impl Into<Task>) -> &mut Self {
        self.queue.push(task);
        self
    }

    /// Append a task by name with positional and keyword arguments
    ///
    /// # Errors
    /// [`FleurinpError::UnknownOperation`] for an unknown name,
    /// [`FleurinpError::Argument`] for malformed arguments
    pub fn add_task(&mut self, name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<&mut Self> {
        let task = Task::from_parts(name, args, kwargs)?;
        Ok(self.add(task))
    }

    /// Append every task of a serialized list; all or nothing
    ///
    /// # Errors
    /// As [`FleurinpModifier::add_task`]
    pub fn add_task_list(&mut self, list: &SerializedTaskList) -> Result<usize> {
        self.queue.load_serialized(list)
    }

    /// Remove the most recent task
    pub fn undo(&mut self) -> bool {
        self.queue.undo_last()
    }

    /// Remove every task
    pub fn undo_all(&mut self) {
        self.queue.undo_all();
    }

    /// Wire form of the queued tasks
    ///
    /// # Errors
    /// [`FleurinpError::Serialization`]
    pub fn task_list(&self) -> Result<SerializedTaskList> {
        self.queue.to_serialized()
    }

    /// Register an auxiliary artifact under `key`
    ///
    /// # Errors
    /// [`FleurinpError::Argument`] if `key` is already bound to another artifact
    pub fn register_node(&mut self, key: impl Into<String>, hash: ContentHash) -> Result<()> {
        let key = key.into();
        match self.nodes.get(&key) {
            Some(existing) if *existing != hash => Err(FleurinpError::argument(format!(
                "side-table key '{key}' is already bound to {}",
                existing.short()
            ))),
            _ => {
                self.nodes.insert(key, hash);
                Ok(())
            }
        }
    }

    /// Add or replace a file with inline content
    pub fn set_file(&mut self, filename: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.add(FileTask::SetFile(SetFile {
            filename: filename.into(),
            text: Some(text.into()),
            node: None,
            source_file: None,
        }))
    }

    /// Add or replace a file with one taken from another stored deck
    ///
    /// `source_file` defaults to `filename`.
    ///
    /// # Errors
    /// As [`FleurinpModifier::register_node`]
    pub fn set_file_from_node(
        &mut self,
        filename: impl Into<String>,
        deck: ContentHash,
        source_file: Option<&str>,
    ) -> Result<&mut Self> {
        let key = format!("files_{}", deck.short());
        self.register_node(key.clone(), deck)?;
        Ok(self.add(FileTask::SetFile(SetFile {
            filename: filename.into(),
            text: None,
            node: Some(key),
            source_file: source_file.map(str::to_string),
        })))
    }

    /// Remove a file
    pub fn del_file(&mut self, filename: impl Into<String>) -> &mut Self {
        self.add(FileTask::DelFile(DelFile {
            filename: filename.into(),
        }))
    }

    /// Set attributes or text tags by name
    pub fn set_inpchanges<K, V>(&mut self, changes: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let changes = changes.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.add(XmlTask::SetInpchanges(SetInpchanges { changes }))
    }

    /// Write a stored k-point set into the deck
    ///
    /// # Errors
    /// As [`FleurinpModifier::register_node`]
    pub fn set_kpointsdata(&mut self, kpoints: ContentHash, name: Option<&str>, switch: bool) -> Result<&mut Self> {
        let key = format!("kpoints_{}", kpoints.short());
        self.register_node(key.clone(), kpoints)?;
        Ok(self.add(XmlTask::SetKpointsdata(SetKpointsdata {
            node: key,
            name: name.map(str::to_string),
            switch,
        })))
    }

    /// Select the named k-point list
    pub fn switch_kpointset(&mut self, list_name: impl Into<String>) -> &mut Self {
        self.add(XmlTask::SwitchKpointset(SwitchKpointset {
            list_name: list_name.into(),
        }))
    }

    /// Use an automatically generated set of `count` k-points
    pub fn set_nkpts(&mut self, count: u32, gamma: bool) -> &mut Self {
        self.add(XmlTask::SetNkpts(SetNkpts { count, gamma }))
    }

    xml_task_methods! {
        /// Set an attribute wherever its name resolves
        set_attrib_value(AttribEdit) => SetAttribValue;
        /// Set an attribute on its first match only
        set_first_attrib_value(AttribEdit) => SetFirstAttribValue;
        set_text(TextEdit) => SetText;
        set_simple_tag(SimpleTagEdit) => SetSimpleTag;
        set_complex_tag(ComplexTagEdit) => SetComplexTag;
        create_tag(TagCreate) => CreateTag;
        delete_tag(TagSelect) => DeleteTag;
        delete_att(AttribDelete) => DeleteAtt;
        replace_tag(TagReplace) => ReplaceTag;
        xml_set_attrib_value_no_create(XPathAttrib) => XmlSetAttribValueNoCreate;
        xml_set_text_no_create(XPathText) => XmlSetTextNoCreate;
        xml_create_tag(XPathCreate) => XmlCreateTag;
        xml_delete_tag(XPathSelect) => XmlDeleteTag;
        xml_delete_att(XPathAttribDelete) => XmlDeleteAtt;
        xml_replace_tag(XPathReplace) => XmlReplaceTag;
        set_species(SpeciesEdit) => SetSpecies;
        set_species_label(SpeciesLabelEdit) => SetSpeciesLabel;
        clone_species(CloneSpecies) => CloneSpecies;
        set_atomgroup(AtomGroupEdit) => SetAtomgroup;
        set_atomgroup_label(AtomGroupLabelEdit) => SetAtomgroupLabel;
        /// Add to or scale numeric attributes
        shift_value(ShiftValue) => ShiftValue;
        shift_value_species_label(ShiftValueSpeciesLabel) => ShiftValueSpeciesLabel;
        /// Edit the LDA+U density matrix
        set_nmmpmat(SetNmmpmat) => SetNmmpmat;
    }

    /// Side-table entries the queue references, loaded from the store
    fn referenced_nodes(&self) -> Result<(BTreeMap<String, ContentHash>, AuxNodes)> {
        let mut hashes = BTreeMap::new();
        let mut nodes = AuxNodes::new();
        for key in self.queue.node_keys() {
            if let Some(hash) = self.nodes.get(&key) {
                nodes.insert(key.clone(), load_node(self.store, hash)?);
                hashes.insert(key, *hash);
            }
        }
        Ok((hashes, nodes))
    }

    /// Replay the queue on a copy of the deck without storing anything
    ///
    /// The result is validated when the session's `validate_preview` is set.
    ///
    /// # Errors
    /// Any interpreter error, or [`FleurinpError::Validation`]
    pub fn show(&self) -> Result<Preview> {
        let (_, nodes) = self.referenced_nodes()?;
        let applied = apply_queue(&self.data, &self.queue, &nodes, self.registry.as_ref(), &self.config)?;
        if self.config.validate_preview {
            applied.check()?;
        }
        Ok(applied.into())
    }

    /// Replay the queue and run the validation gate, storing nothing
    ///
    /// # Errors
    /// Any interpreter error, or [`FleurinpError::Validation`]
    pub fn validate(&self) -> Result<()> {
        let (_, nodes) = self.referenced_nodes()?;
        apply_queue(&self.data, &self.queue, &nodes, self.registry.as_ref(), &self.config)?.check()
    }

    /// Materialize the edited deck
    ///
    /// The task list is stored only together with the result; a session that
    /// fails validation leaves the store as it was. Consumes the session;
    /// keep editing with a new session on the returned hash.
    ///
    /// # Errors
    /// As [`modify_with_task_list`]
    pub fn freeze(self) -> Result<ContentHash> {
        let list = TaskListData::from_list(&self.queue.to_serialized()?)?;
        let modifications = Artifact::<TaskListArtifact>::new(list)?;
        let (nodes, _) = self.referenced_nodes()?;
        let inputs = ModifyInputs {
            original: self.original,
            modifications: *modifications.hash(),
            nodes,
            label: self.label,
            description: self.description,
        };
        modify_with_task_list(self.store, &inputs, modifications, &self.config, self.registry.as_ref())
    }
}
