//! Upgrade of stored task lists to the current wire format
//!
//! Version 1 lists are bare arrays of `[name, args, kwargs]` and may use
//! task names and keyword names that no longer exist. They are rewritten
//! once, here, so the live task model only knows current names.

use crate::error::{FleurinpError, Result};
use crate::tasklist::{SerializedTask, SerializedTaskList, TASK_LIST_VERSION};
use serde_json::{Map, Value};

/// Retired task name, its replacement, its old positional order and
/// the occurrence it implied
struct Alias {
    old: &'static str,
    new: &'static str,
    parameters: &'static [&'static str],
    occurrence: Option<i64>,
}

const ALIASES: &[Alias] = &[
    Alias {
        old: "xml_set_attribv_occ",
        new: "xml_set_attrib_value_no_create",
        parameters: &["xpathn", "attributename", "attribv", "occ", "create"],
        occurrence: None,
    },
    Alias {
        old: "xml_set_first_attribv",
        new: "xml_set_attrib_value_no_create",
        parameters: &["xpathn", "attributename", "attribv", "create"],
        occurrence: Some(0),
    },
    Alias {
        old: "xml_set_all_attribv",
        new: "xml_set_attrib_value_no_create",
        parameters: &["xpathn", "attributename", "attribv", "create"],
        occurrence: None,
    },
    Alias {
        old: "xml_set_text",
        new: "xml_set_text_no_create",
        parameters: &["xpathn", "text", "create"],
        occurrence: Some(0),
    },
    Alias {
        old: "xml_set_all_text",
        new: "xml_set_text_no_create",
        parameters: &["xpathn", "text", "create"],
        occurrence: None,
    },
];

/// Retired keyword names and their replacements
const KEYWORDS: &[(&str, &str)] = &[
    ("xpathn", "xpath"),
    ("attributename", "name"),
    ("attribv", "value"),
    ("occ", "occurrences"),
    ("attributedict", "changes"),
    ("change_dict", "changes"),
    ("nkpts", "count"),
];

/// Decode a stored task list of any supported version
///
/// Accepts a bare array (version 1), `{"version": 1, "tasks": [...]}` and the
/// current `{"version": 2, "tasks": [...]}`. Task names are not checked here;
/// that happens when the list is loaded into a queue.
///
/// # Errors
/// [`FleurinpError::Argument`] for an unsupported version or a malformed entry
pub fn migrate_task_list(value: Value) -> Result<SerializedTaskList> {
    let (version, tasks) = match value {
        Value::Array(tasks) => (1, tasks),
        Value::Object(mut map) => {
            let version = map
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| FleurinpError::argument("task list has no version"))?;
            let tasks = match map.remove("tasks") {
                Some(Value::Array(tasks)) => tasks,
                None => Vec::new(),
                Some(_) => return Err(FleurinpError::argument("'tasks' must be a list")),
            };
            (version, tasks)
        }
        _ => return Err(FleurinpError::argument("task list must be a list or an object")),
    };

    match version {
        1 => {
            let tasks = tasks.into_iter().map(decode_entry).map(|t| t.map(upgrade)).collect::<Result<_>>()?;
            tracing::debug!("migrated version 1 task list");
            Ok(SerializedTaskList {
                version: TASK_LIST_VERSION,
                tasks,
            })
        }
        2 => Ok(SerializedTaskList {
            version: TASK_LIST_VERSION,
            tasks: tasks.into_iter().map(decode_entry).collect::<Result<_>>()?,
        }),
        other => Err(FleurinpError::argument(format!(
            "task list version {other} is newer than supported version {TASK_LIST_VERSION}"
        ))),
    }
}

/// `[name]`, `[name, args]` or `[name, args, kwargs]`
fn decode_entry(entry: Value) -> Result<SerializedTask> {
    let Value::Array(parts) = entry else {
        return Err(FleurinpError::argument("task entry must be a list"));
    };
    let mut parts = parts.into_iter();
    let name = match parts.next() {
        Some(Value::String(name)) => name,
        _ => return Err(FleurinpError::argument("task entry must start with its name")),
    };
    let args = match parts.next() {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(args)) => args,
        Some(_) => return Err(FleurinpError::argument(format!("{name}: arguments must be a list"))),
    };
    let kwargs = match parts.next() {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(kwargs)) => kwargs,
        Some(_) => {
            return Err(FleurinpError::argument(format!(
                "{name}: keyword arguments must be a mapping"
            )))
        }
    };
    if parts.next().is_some() {
        return Err(FleurinpError::argument(format!("{name}: task entry has extra fields")));
    }
    Ok(SerializedTask(name, args, kwargs))
}

fn upgrade(task: SerializedTask) -> SerializedTask {
    let SerializedTask(name, args, kwargs) = task;
    let Some(alias) = ALIASES.iter().find(|a| a.old == name) else {
        return SerializedTask(name, args, rename_keywords(kwargs));
    };

    let mut named = kwargs;
    for (param, arg) in alias.parameters.iter().zip(args) {
        named.entry((*param).to_string()).or_insert(arg);
    }
    let mut kwargs = rename_keywords(named);
    // the replacements never create missing elements
    kwargs.remove("create");
    if let Some(occurrence) = alias.occurrence {
        kwargs.insert("occurrences".to_string(), Value::from(occurrence));
    }
    tracing::debug!(old = alias.old, new = alias.new, "renamed retired task");
    SerializedTask(alias.new.to_string(), Vec::new(), kwargs)
}

fn rename_keywords(kwargs: Map<String, Value>) -> Map<String, Value> {
    kwargs
        .into_iter()
        .map(|(key, value)| {
            let key = KEYWORDS
                .iter()
                .find(|(old, _)| *old == key)
                .map_or(key, |(_, new)| (*new).to_string());
            (key, value)
        })
        .collect()
}
