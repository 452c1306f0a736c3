//! Modification queue
//!
//! File tasks and XML tasks live in two separately ordered queues because
//! they run in two passes: every file task before any XML task. The append
//! order across both is kept as well, so undo and serialization see the
//! sequence exactly as the caller built it.

use crate::error::Result;
use crate::task::{FileTask, Task, XmlTask};
use crate::tasklist::{SerializedTask, SerializedTaskList, TASK_LIST_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Xml,
}

/// Ordered, append-only task list with undo
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModificationQueue {
    file_ops: Vec<FileTask>,
    xml_ops: Vec<XmlTask>,
    order: Vec<Kind>,
}

impl ModificationQueue {
    /// Empty queue
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task
    ///
    /// Returns `true` if this is a file task appended after an XML task, i.e.
    /// it will run earlier than its position suggests.
    pub fn push(&mut self, task: impl Into<Task>) -> bool {
        match task.into() {
            Task::File(task) => {
                let hoisted = !self.xml_ops.is_empty();
                if hoisted {
                    tracing::warn!(
                        task = Task::File(task.clone()).name(),
                        "file task appended after XML edits; it runs before all of them"
                    );
                }
                self.file_ops.push(task);
                self.order.push(Kind::File);
                hoisted
            }
            Task::Xml(task) => {
                self.xml_ops.push(task);
                self.order.push(Kind::Xml);
                false
            }
        }
    }

    /// Remove the most recently appended task
    ///
    /// Returns whether a task was removed.
    pub fn undo_last(&mut self) -> bool {
        match self.order.pop() {
            Some(Kind::File) => self.file_ops.pop().is_some(),
            Some(Kind::Xml) => self.xml_ops.pop().is_some(),
            None => false,
        }
    }

    /// Remove every task
    pub fn undo_all(&mut self) {
        self.file_ops.clear();
        self.xml_ops.clear();
        self.order.clear();
    }

    /// Number of tasks
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no task is queued
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// File tasks in append order
    #[inline]
    #[must_use]
    pub fn file_tasks(&self) -> &[FileTask] {
        &self.file_ops
    }

    /// XML tasks in append order
    #[inline]
    #[must_use]
    pub fn xml_tasks(&self) -> &[XmlTask] {
        &self.xml_ops
    }

    /// All tasks in append order
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        let mut files = self.file_ops.iter();
        let mut xml = self.xml_ops.iter();
        self.order
            .iter()
            .filter_map(|kind| match kind {
                Kind::File => files.next().cloned().map(Task::File),
                Kind::Xml => xml.next().cloned().map(Task::Xml),
            })
            .collect()
    }

    /// Whether any file task was appended after an XML task
    #[must_use]
    pub fn is_reordered(&self) -> bool {
        self.order
            .iter()
            .skip_while(|kind| **kind == Kind::File)
            .any(|kind| *kind == Kind::File)
    }

    /// Side-table keys referenced by queued tasks, sorted and deduplicated
    #[must_use]
    pub fn node_keys(&self) -> Vec<String> {
        let files = self.file_ops.iter().filter_map(|task| match task {
            FileTask::SetFile(set) => set.node.as_deref(),
            FileTask::DelFile(_) => None,
        });
        let xml = self.xml_ops.iter().filter_map(XmlTask::node_key);
        let mut keys: Vec<String> = files.chain(xml).map(str::to_string).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Wire form in append order
    ///
    /// # Errors
    /// [`crate::FleurinpError::Serialization`] if a payload cannot be encoded
    pub fn to_serialized(&self) -> Result<SerializedTaskList> {
        let tasks = self
            .tasks()
            .iter()
            .map(|task| {
                let (name, kwargs) = task.to_parts()?;
                Ok(SerializedTask::new(name, kwargs))
            })
            .collect::<Result<_>>()?;
        Ok(SerializedTaskList {
            version: TASK_LIST_VERSION,
            tasks,
        })
    }

    /// Append every task of a serialized list
    ///
    /// Either all tasks are appended or, on error, none.
    ///
    /// # Errors
    /// [`crate::FleurinpError::UnknownOperation`] for an unknown name,
    /// [`crate::FleurinpError::Argument`] for malformed arguments
    pub fn load_serialized(&mut self, list: &SerializedTaskList) -> Result<usize> {
        let tasks = list
            .tasks
            .iter()
            .map(|SerializedTask(name, args, kwargs)| Task::from_parts(name, args.clone(), kwargs.clone()))
            .collect::<Result<Vec<_>>>()?;
        let count = tasks.len();
        for task in tasks {
            self.push(task);
        }
        Ok(count)
    }

    /// Queue holding exactly the tasks of a serialized list
    ///
    /// # Errors
    /// As [`ModificationQueue::load_serialized`]
    pub fn from_serialized(list: &SerializedTaskList) -> Result<Self> {
        let mut queue = Self::new();
        queue.load_serialized(list)?;
        Ok(queue)
    }
}
