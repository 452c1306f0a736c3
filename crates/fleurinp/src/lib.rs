//! FLEUR input decks and their modification
//!
//! An input deck ([`FleurinpData`]) is an immutable, content-addressed file
//! set around `inp.xml`. Decks are changed by queueing typed tasks on a
//! [`FleurinpModifier`] and materializing them into a new deck:
//!
//! - [`ModificationQueue`]: file tasks and XML tasks, append-only with undo
//! - [`Interpreter`]: replays XML tasks on the combined tree and the
//!   `n_mmp_mat` side channel
//! - [`gate::check`]: schema validation of the result
//! - [`modify_fleurinpdata`]: replay, validate, split includes and store the
//!   new deck with a provenance record linking it to its inputs
//!
//! # Example
//!
//! ```rust,ignore
//! use fleurinp::{FleurinpData, FleurinpModifier, AttribEdit};
//! use fleurinp_artifact::ArtifactStore;
//!
//! let store = ArtifactStore::new();
//! let original = store.insert(FleurinpData::from_dir("Fe_bulk")?.into_artifact()?)?;
//!
//! let mut session = FleurinpModifier::new(&store, original)?;
//! session
//!     .set_inpchanges([("itmax", 99)])
//!     .set_attrib_value(AttribEdit::new("radius", 2.1).contains("species"));
//! let modified = session.freeze()?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod data;
mod error;
pub mod gate;
mod interpreter;
mod kpoints;
mod materialize;
mod migrate;
mod modifier;
mod queue;
pub mod task;
mod tasklist;

pub use config::ModifierConfig;
pub use data::{FleurinpArtifact, FleurinpBuilder, FleurinpData, LoadedInput, INP_XML, NMMP_MAT};
pub use error::{FleurinpError, Result};
pub use interpreter::{apply_file_tasks, AuxNode, AuxNodes, EditState, Interpreter};
pub use kpoints::{KpointsArtifact, KpointsData};
pub use materialize::{
    apply_queue, load_node, modify_fleurinpdata, modify_with_task_list, AppliedQueue, ModifyInputs, Preview, MODIFICATIONS_INPUT,
    MODIFY_PROCESS, ORIGINAL_INPUT,
};
pub use migrate::migrate_task_list;
pub use modifier::FleurinpModifier;
pub use queue::ModificationQueue;
pub use task::{
    AttribEdit, FileTask, OneOrMany, Occurrences, PathFilter, ShiftMode, Task, TextEdit, XmlTask,
};
pub use tasklist::{SerializedTask, SerializedTaskList, TaskListArtifact, TaskListData, TASK_LIST_VERSION};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
