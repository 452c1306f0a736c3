//! Serialized task lists
//!
//! The wire form of a queue is `{"version": 2, "tasks": [[name, [args], {kwargs}], ...]}`
//! in append order. It is what gets stored next to a materialized deck, so
//! the edit history survives process boundaries.

use crate::error::Result;
use crate::migrate::migrate_task_list;
use fleurinp_artifact::{ArtifactError, ArtifactType, ContentHash, __private::Sealed};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current wire format version
pub const TASK_LIST_VERSION: u32 = 2;

/// One task as `[name, [args...], {kwargs...}]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTask(pub String, pub Vec<Value>, pub Map<String, Value>);

impl SerializedTask {
    /// Task with keyword arguments only
    #[must_use]
    pub fn new(name: impl Into<String>, kwargs: Map<String, Value>) -> Self {
        Self(name.into(), Vec::new(), kwargs)
    }

    /// Task name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Versioned list of serialized tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTaskList {
    pub version: u32,
    pub tasks: Vec<SerializedTask>,
}

impl Default for SerializedTaskList {
    fn default() -> Self {
        Self {
            version: TASK_LIST_VERSION,
            tasks: Vec::new(),
        }
    }
}

impl SerializedTaskList {
    /// Canonical JSON text (object keys sorted)
    ///
    /// # Errors
    /// [`FleurinpError::Serialization`]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse JSON text of any supported version, migrating old lists
    ///
    /// # Errors
    /// [`FleurinpError::Serialization`] for invalid JSON,
    /// [`FleurinpError::Argument`] for an unsupported layout
    pub fn from_json(text: &str) -> Result<Self> {
        migrate_task_list(serde_json::from_str(text)?)
    }
}

/// Stored form of a task list: its canonical JSON text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListData {
    json: String,
}

impl TaskListData {
    /// Freeze a task list
    ///
    /// # Errors
    /// [`FleurinpError::Serialization`]
    pub fn from_list(list: &SerializedTaskList) -> Result<Self> {
        Ok(Self { json: list.to_json()? })
    }

    /// Decode the stored list
    ///
    /// # Errors
    /// [`FleurinpError::Serialization`] or [`FleurinpError::Argument`]
    pub fn list(&self) -> Result<SerializedTaskList> {
        SerializedTaskList::from_json(&self.json)
    }

    /// Canonical JSON text
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> &str {
        &self.json
    }
}

/// Artifact type of stored task lists
#[derive(Debug, Clone)]
pub struct TaskListArtifact;

impl Sealed for TaskListArtifact {}

impl ArtifactType for TaskListArtifact {
    type Content = TaskListData;

    fn hash(content: &Self::Content) -> ContentHash {
        ContentHash::compute(content.json.as_bytes())
    }

    const TYPE_ID: &'static str = "fleur.tasklist";

    fn validate_content(content: &Self::Content) -> std::result::Result<(), ArtifactError> {
        serde_json::from_str::<SerializedTaskList>(&content.json)
            .map(|_| ())
            .map_err(|e| ArtifactError::InvariantViolation(format!("malformed task list: {e}")))
    }
}
