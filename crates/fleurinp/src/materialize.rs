//! Replaying a queue and persisting the result
//!
//! [`apply_queue`] runs both passes on a copy of the original deck and is
//! shared by previews and materialization. [`modify_fleurinpdata`] is the
//! persisted form: it reads every input from the store, replays the stored
//! task list, passes the result through the validation gate and stores the
//! new deck together with its provenance record. [`modify_with_task_list`]
//! does the same for a task list that is only stored once the run succeeds.

use crate::config::ModifierConfig;
use crate::data::{FleurinpArtifact, FleurinpBuilder, FleurinpData, LoadedInput, INP_XML, NMMP_MAT};
use crate::error::{FleurinpError, Result};
use crate::gate;
use crate::interpreter::{apply_file_tasks, AuxNode, AuxNodes, EditState, Interpreter};
use crate::kpoints::KpointsArtifact;
use crate::queue::ModificationQueue;
use crate::tasklist::TaskListArtifact;
use fleurinp_artifact::{Artifact, ArtifactStore, ContentHash, StoreError};
use fleurinp_xml::{split_includes, write_xml, Element, SchemaRegistry};
use std::collections::BTreeMap;

/// Process name of materialization provenance records
pub const MODIFY_PROCESS: &str = "modify_fleurinpdata";

/// Input link of the original deck
pub const ORIGINAL_INPUT: &str = "original";

/// Input link of the stored task list
pub const MODIFICATIONS_INPUT: &str = "modifications";

/// Outcome of replaying a queue on a copy of a deck
#[derive(Debug, Clone)]
pub struct AppliedQueue {
    /// File set after the file pass; still holds the unedited `inp.xml`
    pub builder: FleurinpBuilder,
    /// The file-pass result as loaded for editing
    pub loaded: LoadedInput,
    /// Edited tree and side channel
    pub state: EditState,
    /// The original's version has no schema of its own
    pub develop: bool,
}

/// Run the file pass, load the result and run the XML pass
///
/// # Errors
/// Any error of the first task that fails, or
/// [`FleurinpError::InvalidInput`] if the file pass leaves an unloadable deck
pub fn apply_queue(
    original: &FleurinpData,
    queue: &ModificationQueue,
    nodes: &AuxNodes,
    registry: &dyn SchemaRegistry,
    config: &ModifierConfig,
) -> Result<AppliedQueue> {
    let mut builder = original.to_builder();
    apply_file_tasks(&mut builder, queue.file_tasks(), nodes)?;
    let staged = builder.clone().build()?;
    let loaded = staged.load_xml(registry, config.allow_develop_versions)?;
    let develop = original.inp_version() != loaded.schema.version();

    let mut state = EditState::new(loaded.tree.clone(), staged.file(NMMP_MAT))?;
    Interpreter::new(&loaded.schema, nodes).apply_all(&mut state, queue.xml_tasks())?;
    Ok(AppliedQueue {
        builder,
        loaded,
        state,
        develop,
    })
}

impl AppliedQueue {
    /// Pass the edited state through the validation gate
    ///
    /// # Errors
    /// [`FleurinpError::Validation`]
    pub fn check(&self) -> Result<()> {
        gate::check(
            &self.state.tree,
            &self.loaded.schema,
            self.develop,
            self.state.nmmp.as_deref(),
        )
    }

    /// Write the edited state back into files
    ///
    /// Included documents are split out of the combined tree again; an
    /// included file whose subtree was deleted is dropped from the set.
    ///
    /// # Errors
    /// [`FleurinpError::Xml`] if a tree cannot be written
    pub fn into_builder(self) -> Result<FleurinpBuilder> {
        let Self {
            mut builder,
            loaded,
            state,
            ..
        } = self;
        let (primary, included) = split_includes(&state.tree, &loaded.includes)?;
        builder.set_file(INP_XML, write_xml(INP_XML, &primary)?);
        for file in loaded.includes.files() {
            match included.get(file) {
                Some(subtree) => {
                    builder.set_file(file, write_xml(file, subtree)?);
                }
                None => {
                    builder.del_file(file)?;
                }
            }
        }
        match state.nmmp_bytes() {
            Some(bytes) => {
                builder.set_file(NMMP_MAT, bytes);
            }
            None => {
                builder.del_file(NMMP_MAT)?;
            }
        }
        Ok(builder)
    }
}

/// A replayed but unpersisted result
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    /// Edited combined tree
    pub tree: Element,
    /// Edited side channel lines
    pub nmmp: Option<Vec<String>>,
    /// Version of the schema the tree was edited with
    pub schema_version: String,
    /// The original's version has no schema of its own
    pub develop: bool,
}

impl From<AppliedQueue> for Preview {
    fn from(applied: AppliedQueue) -> Self {
        Self {
            schema_version: applied.loaded.schema.version().to_string(),
            tree: applied.state.tree,
            nmmp: applied.state.nmmp,
            develop: applied.develop,
        }
    }
}

/// Everything a materialization reads from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyInputs {
    /// Deck to edit
    pub original: ContentHash,
    /// Task list, stored or stored together with the result
    pub modifications: ContentHash,
    /// Auxiliary artifacts by side-table key
    pub nodes: BTreeMap<String, ContentHash>,
    /// Label of the result; the original's when unset
    pub label: Option<String>,
    /// Description of the result; the original's when unset
    pub description: Option<String>,
}

impl ModifyInputs {
    /// Inputs without auxiliary nodes or metadata overrides
    #[must_use]
    pub fn new(original: ContentHash, modifications: ContentHash) -> Self {
        Self {
            original,
            modifications,
            nodes: BTreeMap::new(),
            label: None,
            description: None,
        }
    }

    /// Provenance input links
    ///
    /// # Errors
    /// [`FleurinpError::Argument`] if a side-table key collides with a
    /// reserved link name
    pub fn links(&self) -> Result<BTreeMap<String, ContentHash>> {
        let mut links = BTreeMap::from([
            (ORIGINAL_INPUT.to_string(), self.original),
            (MODIFICATIONS_INPUT.to_string(), self.modifications),
        ]);
        for (key, hash) in &self.nodes {
            if links.insert(key.clone(), *hash).is_some() {
                return Err(FleurinpError::argument(format!(
                    "side-table key '{key}' is reserved"
                )));
            }
        }
        Ok(links)
    }
}

/// Fetch an auxiliary artifact of either supported type
///
/// # Errors
/// [`FleurinpError::Store`] if the hash is unknown or of another type
pub fn load_node(store: &ArtifactStore, hash: &ContentHash) -> Result<AuxNode> {
    match store.get::<KpointsArtifact>(hash) {
        Ok(kpoints) => Ok(AuxNode::Kpoints(kpoints.into_content())),
        Err(StoreError::TypeMismatch { .. }) => {
            Ok(AuxNode::Fleurinp(store.get::<FleurinpArtifact>(hash)?.into_content()))
        }
        Err(other) => Err(other.into()),
    }
}

/// Replay a stored task list on a stored deck and store the result
///
/// Nothing is stored unless every task applies and the result passes the
/// validation gate. Returns the hash of the new deck.
///
/// # Errors
/// [`FleurinpError::UnknownOperation`] for an unknown task name in the list,
/// any interpreter error, [`FleurinpError::Validation`], or a store error
pub fn modify_fleurinpdata(
    store: &ArtifactStore,
    inputs: &ModifyInputs,
    config: &ModifierConfig,
    registry: &dyn SchemaRegistry,
) -> Result<ContentHash> {
    let modifications = store.get::<TaskListArtifact>(&inputs.modifications)?;
    modify_with_task_list(store, inputs, modifications, config, registry)
}

/// Replay a task list that need not be stored yet
///
/// The task list is stored together with the new deck, after the gate has
/// accepted the result; a failed run leaves the store untouched.
/// `inputs.modifications` must be the hash of `modifications`.
///
/// The new deck's origin is the key of its provenance record, so its
/// identity differs from every deck it was derived from. Replaying the same
/// inputs with the same label and description gives the same deck again.
///
/// # Errors
/// As [`modify_fleurinpdata`], and [`FleurinpError::Argument`] if the hashes
/// disagree
pub fn modify_with_task_list(
    store: &ArtifactStore,
    inputs: &ModifyInputs,
    modifications: Artifact<TaskListArtifact>,
    config: &ModifierConfig,
    registry: &dyn SchemaRegistry,
) -> Result<ContentHash> {
    if *modifications.hash() != inputs.modifications {
        return Err(FleurinpError::argument(format!(
            "task list {} is not the modifications input {}",
            modifications.hash().short(),
            inputs.modifications.short()
        )));
    }
    let links = inputs.links()?;
    let original = store.get::<FleurinpArtifact>(&inputs.original)?.into_content();
    let label = inputs.label.clone().unwrap_or_else(|| original.label().to_string());
    let description = inputs
        .description
        .clone()
        .unwrap_or_else(|| original.description().to_string());

    if config.use_cache {
        if let Some(cached) = store.lookup(MODIFY_PROCESS, &links) {
            match store.get::<FleurinpArtifact>(&cached) {
                Ok(deck) if deck.content().label() == label && deck.content().description() == description => {
                    tracing::info!(output = %cached.short(), "reusing stored modification result");
                    return Ok(cached);
                }
                Ok(_) => tracing::debug!(output = %cached.short(), "stored result has other metadata, replaying"),
                Err(e) => tracing::debug!(error = %e, "stored result unavailable, replaying"),
            }
        }
    }

    let list = modifications.content().list()?;
    let queue = ModificationQueue::from_serialized(&list)?;
    let mut nodes = AuxNodes::new();
    for (key, hash) in &inputs.nodes {
        nodes.insert(key.clone(), load_node(store, hash)?);
    }

    let applied = apply_queue(&original, &queue, &nodes, registry, config)?;
    applied.check()?;
    let origin = ArtifactStore::record_key(MODIFY_PROCESS, &links)?;
    let data = applied
        .into_builder()?
        .with_label(label)
        .with_description(description)
        .with_origin(origin)
        .build()?;
    let artifact = data.into_artifact()?;

    store.insert(modifications)?;
    let output = store.insert(artifact)?;
    store.record(MODIFY_PROCESS, links, output)?;
    tracing::info!(
        original = %inputs.original.short(),
        output = %output.short(),
        tasks = queue.len(),
        "materialized modified input"
    );
    Ok(output)
}
