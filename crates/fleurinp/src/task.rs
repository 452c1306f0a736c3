//! Typed modification tasks
//!
//! Every modification is one variant of [`FileTask`] or [`XmlTask`] with a
//! typed payload. Task names are stable snake_case strings used by the
//! serialized task list; [`Task::from_parts`] is the only place a name is
//! looked up, so an unknown name can never reach the interpreter.

use crate::error::{FleurinpError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single value or a list of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// One value
    One(T),
    /// Several values
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    /// All values as a vector
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v.clone()],
            Self::Many(vs) => vs.clone(),
        }
    }
}

impl From<i64> for OneOrMany<i64> {
    fn from(value: i64) -> Self {
        Self::One(value)
    }
}

impl From<&str> for OneOrMany<String> {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for OneOrMany<String> {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values)
    }
}

impl<T, const N: usize> From<[T; N]> for OneOrMany<T> {
    fn from(values: [T; N]) -> Self {
        Self::Many(values.into())
    }
}

/// Occurrence selector: `None` selects every match
pub type Occurrences = Option<OneOrMany<i64>>;

/// Path filters: substrings a schema path must (not) contain
pub type PathFilter = Option<OneOrMany<String>>;

/// How `shift_value` combines old value and change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftMode {
    /// `old + change`
    #[default]
    Abs,
    /// `old * change`
    Rel,
}

/// Tasks acting on the deck's file set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "kwargs", rename_all = "snake_case")]
pub enum FileTask {
    /// Add or replace a file
    SetFile(SetFile),
    /// Remove a file
    DelFile(DelFile),
}

/// Payload of `set_file`: content given inline or taken from another deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetFile {
    pub filename: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Side-table key of a deck to copy the file from
    #[serde(default)]
    pub node: Option<String>,
    /// File name inside `node`; defaults to `filename`
    #[serde(default)]
    pub source_file: Option<String>,
}

/// Payload of `del_file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelFile {
    pub filename: String,
}

/// Tasks acting on the combined XML tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "kwargs", rename_all = "snake_case")]
pub enum XmlTask {
    SetInpchanges(SetInpchanges),
    SetAttribValue(AttribEdit),
    SetFirstAttribValue(AttribEdit),
    SetText(TextEdit),
    SetSimpleTag(SimpleTagEdit),
    SetComplexTag(ComplexTagEdit),
    CreateTag(TagCreate),
    DeleteTag(TagSelect),
    DeleteAtt(AttribDelete),
    ReplaceTag(TagReplace),
    XmlSetAttribValueNoCreate(XPathAttrib),
    XmlSetTextNoCreate(XPathText),
    XmlCreateTag(XPathCreate),
    XmlDeleteTag(XPathSelect),
    XmlDeleteAtt(XPathAttribDelete),
    XmlReplaceTag(XPathReplace),
    SetSpecies(SpeciesEdit),
    SetSpeciesLabel(SpeciesLabelEdit),
    CloneSpecies(CloneSpecies),
    SetAtomgroup(AtomGroupEdit),
    SetAtomgroupLabel(AtomGroupLabelEdit),
    ShiftValue(ShiftValue),
    ShiftValueSpeciesLabel(ShiftValueSpeciesLabel),
    SetKpointsdata(SetKpointsdata),
    SwitchKpointset(SwitchKpointset),
    SetNkpts(SetNkpts),
    SetNmmpmat(SetNmmpmat),
}

/// Payload of `set_inpchanges`: attribute or text tag name to new value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetInpchanges {
    pub changes: BTreeMap<String, Value>,
}

/// Payload of `set_attrib_value` and `set_first_attrib_value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttribEdit {
    pub name: String,
    /// Scalar for every match, or one value per selected match
    pub value: Value,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    #[serde(default)]
    pub occurrences: Occurrences,
    /// Create the element (and its parents) if it does not exist
    #[serde(default)]
    pub create: bool,
}

impl AttribEdit {
    /// Set attribute `name` on every match
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            contains: None,
            not_contains: None,
            occurrences: None,
            create: false,
        }
    }

    /// Only paths containing `filter`
    #[must_use]
    pub fn contains(mut self, filter: impl Into<OneOrMany<String>>) -> Self {
        self.contains = Some(filter.into());
        self
    }

    /// Only paths not containing `filter`
    #[must_use]
    pub fn not_contains(mut self, filter: impl Into<OneOrMany<String>>) -> Self {
        self.not_contains = Some(filter.into());
        self
    }

    /// Only these matches (0-based, negative from the end)
    #[must_use]
    pub fn occurrences(mut self, occurrences: impl Into<OneOrMany<i64>>) -> Self {
        self.occurrences = Some(occurrences.into());
        self
    }

    /// Create missing elements
    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

/// Payload of `set_text`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextEdit {
    pub name: String,
    pub text: Value,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    #[serde(default)]
    pub occurrences: Occurrences,
    #[serde(default)]
    pub create: bool,
}

impl TextEdit {
    /// Set the text of tag `name` on every match
    #[must_use]
    pub fn new(name: impl Into<String>, text: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            contains: None,
            not_contains: None,
            occurrences: None,
            create: false,
        }
    }

    /// Only these matches
    #[must_use]
    pub fn occurrences(mut self, occurrences: impl Into<OneOrMany<i64>>) -> Self {
        self.occurrences = Some(occurrences.into());
        self
    }
}

/// Payload of `set_simple_tag`: replace all `tag_name` children by new ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleTagEdit {
    pub tag_name: String,
    /// Attributes of each new tag
    pub changes: OneOrMany<Map<String, Value>>,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    #[serde(default)]
    pub create_parents: bool,
}

/// Payload of `set_complex_tag`: nested attribute and child changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplexTagEdit {
    pub tag_name: String,
    pub changes: Map<String, Value>,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    #[serde(default)]
    pub create: bool,
}

/// Payload of `create_tag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagCreate {
    /// Tag name or an XML snippet of the element to insert
    pub tag_name: String,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    /// Occurrences of the parent to insert into
    #[serde(default)]
    pub occurrences: Occurrences,
    #[serde(default)]
    pub create_parents: bool,
}

/// Payload of `delete_tag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagSelect {
    pub tag_name: String,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `delete_att`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttribDelete {
    pub name: String,
    /// Restrict to elements with this tag name
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `replace_tag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagReplace {
    pub tag_name: String,
    /// XML snippet of the replacement element
    pub element: String,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `xml_set_attrib_value_no_create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XPathAttrib {
    pub xpath: String,
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `xml_set_text_no_create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XPathText {
    pub xpath: String,
    pub text: Value,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `xml_create_tag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XPathCreate {
    /// Path of the parent elements
    pub xpath: String,
    /// Tag name or XML snippet
    pub element: String,
    #[serde(default)]
    pub create_parents: bool,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `xml_delete_tag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XPathSelect {
    pub xpath: String,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `xml_delete_att`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XPathAttribDelete {
    pub xpath: String,
    pub name: String,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `xml_replace_tag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XPathReplace {
    pub xpath: String,
    pub element: String,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `set_species`
///
/// `species_name` is a name, `all`, or `all-<x>` for every species whose
/// name contains `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeciesEdit {
    pub species_name: String,
    pub changes: Map<String, Value>,
    #[serde(default = "default_true")]
    pub create: bool,
}

/// Payload of `set_species_label`: edit the species of the atom with a label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeciesLabelEdit {
    pub atom_label: String,
    pub changes: Map<String, Value>,
    #[serde(default = "default_true")]
    pub create: bool,
}

/// Payload of `clone_species`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloneSpecies {
    pub species_name: String,
    pub new_name: String,
    #[serde(default)]
    pub changes: Option<Map<String, Value>>,
}

/// Payload of `set_atomgroup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtomGroupEdit {
    pub changes: Map<String, Value>,
    /// 1-based atom group positions
    #[serde(default)]
    pub position: Option<OneOrMany<usize>>,
    /// Species selector (`all`, `all-<x>` or a name)
    #[serde(default)]
    pub species: Option<String>,
}

/// Payload of `set_atomgroup_label`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtomGroupLabelEdit {
    pub atom_label: String,
    pub changes: Map<String, Value>,
}

/// Payload of `shift_value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShiftValue {
    /// Attribute name to change
    pub changes: BTreeMap<String, f64>,
    #[serde(default)]
    pub mode: ShiftMode,
    #[serde(default)]
    pub contains: PathFilter,
    #[serde(default)]
    pub not_contains: PathFilter,
    #[serde(default)]
    pub occurrences: Occurrences,
}

/// Payload of `shift_value_species_label`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShiftValueSpeciesLabel {
    pub atom_label: String,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub mode: ShiftMode,
}

/// Payload of `set_kpointsdata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetKpointsdata {
    /// Side-table key of the k-point set
    pub node: String,
    /// Name of the list (named list layouts only)
    #[serde(default)]
    pub name: Option<String>,
    /// Select the new list for the calculation
    #[serde(default = "default_true")]
    pub switch: bool,
}

/// Payload of `switch_kpointset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchKpointset {
    pub list_name: String,
}

/// Payload of `set_nkpts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetNkpts {
    pub count: u32,
    #[serde(default)]
    pub gamma: bool,
}

/// Payload of `set_nmmpmat`
///
/// Exactly one of `state_occupations` (diagonal, `2l+1` values) and `denmat`
/// (`(2l+1)²` complex entries as `[re, im]`) must be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetNmmpmat {
    pub species_name: String,
    pub orbital: u32,
    /// 1-based spin index
    pub spin: u32,
    #[serde(default)]
    pub state_occupations: Option<Vec<f64>>,
    #[serde(default)]
    pub denmat: Option<Vec<Vec<[f64; 2]>>>,
}

fn default_true() -> bool {
    true
}

/// Either kind of task
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Changes the file set
    File(FileTask),
    /// Changes the XML tree
    Xml(XmlTask),
}

impl From<FileTask> for Task {
    fn from(task: FileTask) -> Self {
        Self::File(task)
    }
}

impl From<XmlTask> for Task {
    fn from(task: XmlTask) -> Self {
        Self::Xml(task)
    }
}

/// Positional parameter order of every task
const PARAMETERS: &[(&str, &[&str])] = &[
    ("set_file", &["filename", "text", "node", "source_file"]),
    ("del_file", &["filename"]),
    ("set_inpchanges", &["changes"]),
    ("set_attrib_value", &["name", "value", "contains", "not_contains", "occurrences", "create"]),
    ("set_first_attrib_value", &["name", "value", "contains", "not_contains", "occurrences", "create"]),
    ("set_text", &["name", "text", "contains", "not_contains", "occurrences", "create"]),
    ("set_simple_tag", &["tag_name", "changes", "contains", "not_contains", "create_parents"]),
    ("set_complex_tag", &["tag_name", "changes", "contains", "not_contains", "create"]),
    ("create_tag", &["tag_name", "contains", "not_contains", "occurrences", "create_parents"]),
    ("delete_tag", &["tag_name", "contains", "not_contains", "occurrences"]),
    ("delete_att", &["name", "tag_name", "contains", "not_contains", "occurrences"]),
    ("replace_tag", &["tag_name", "element", "contains", "not_contains", "occurrences"]),
    ("xml_set_attrib_value_no_create", &["xpath", "name", "value", "occurrences"]),
    ("xml_set_text_no_create", &["xpath", "text", "occurrences"]),
    ("xml_create_tag", &["xpath", "element", "create_parents", "occurrences"]),
    ("xml_delete_tag", &["xpath", "occurrences"]),
    ("xml_delete_att", &["xpath", "name", "occurrences"]),
    ("xml_replace_tag", &["xpath", "element", "occurrences"]),
    ("set_species", &["species_name", "changes", "create"]),
    ("set_species_label", &["atom_label", "changes", "create"]),
    ("clone_species", &["species_name", "new_name", "changes"]),
    ("set_atomgroup", &["changes", "position", "species"]),
    ("set_atomgroup_label", &["atom_label", "changes"]),
    ("shift_value", &["changes", "mode", "contains", "not_contains", "occurrences"]),
    ("shift_value_species_label", &["atom_label", "name", "value", "mode"]),
    ("set_kpointsdata", &["node", "name", "switch"]),
    ("switch_kpointset", &["list_name"]),
    ("set_nkpts", &["count", "gamma"]),
    ("set_nmmpmat", &["species_name", "orbital", "spin", "state_occupations", "denmat"]),
];

const FILE_TASKS: &[&str] = &["set_file", "del_file"];

/// Names of every known task
pub fn task_names() -> impl Iterator<Item = &'static str> {
    PARAMETERS.iter().map(|(name, _)| *name)
}

impl Task {
    /// Stable name of this task
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::File(FileTask::SetFile(_)) => "set_file",
            Self::File(FileTask::DelFile(_)) => "del_file",
            Self::Xml(task) => task.name(),
        }
    }

    /// Whether this task changes the file set
    #[inline]
    #[must_use]
    pub fn is_file_task(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// Build a task from its name and arguments
    ///
    /// Positional arguments fill the task's parameters in declaration order;
    /// a parameter given both ways is an error.
    ///
    /// # Errors
    /// [`FleurinpError::UnknownOperation`] for an unknown name,
    /// [`FleurinpError::Argument`] for malformed arguments
    pub fn from_parts(name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Self> {
        let parameters = PARAMETERS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, params)| *params)
            .ok_or_else(|| FleurinpError::UnknownOperation {
                name: name.to_string(),
            })?;
        if args.len() > parameters.len() {
            return Err(FleurinpError::argument(format!(
                "{name} takes at most {} positional arguments, got {}",
                parameters.len(),
                args.len()
            )));
        }
        let mut merged = kwargs;
        for (param, arg) in parameters.iter().zip(args) {
            if merged.insert((*param).to_string(), arg).is_some() {
                return Err(FleurinpError::argument(format!(
                    "{name}: '{param}' given positionally and by keyword"
                )));
            }
        }
        let tagged = serde_json::json!({ "name": name, "kwargs": Value::Object(merged) });
        let malformed = |e: serde_json::Error| FleurinpError::argument(format!("{name}: {e}"));
        if FILE_TASKS.contains(&name) {
            Ok(Self::File(serde_json::from_value(tagged).map_err(malformed)?))
        } else {
            Ok(Self::Xml(serde_json::from_value(tagged).map_err(malformed)?))
        }
    }

    /// Name and keyword arguments, omitting unset optional parameters
    ///
    /// # Errors
    /// [`FleurinpError::Serialization`] if a payload cannot be encoded
    pub fn to_parts(&self) -> Result<(String, Map<String, Value>)> {
        let encoded = match self {
            Self::File(task) => serde_json::to_value(task)?,
            Self::Xml(task) => serde_json::to_value(task)?,
        };
        let mut kwargs = match encoded.get("kwargs") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        kwargs.retain(|_, v| !v.is_null());
        Ok((self.name().to_string(), kwargs))
    }
}

impl XmlTask {
    /// Stable name of this task
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetInpchanges(_) => "set_inpchanges",
            Self::SetAttribValue(_) => "set_attrib_value",
            Self::SetFirstAttribValue(_) => "set_first_attrib_value",
            Self::SetText(_) => "set_text",
            Self::SetSimpleTag(_) => "set_simple_tag",
            Self::SetComplexTag(_) => "set_complex_tag",
            Self::CreateTag(_) => "create_tag",
            Self::DeleteTag(_) => "delete_tag",
            Self::DeleteAtt(_) => "delete_att",
            Self::ReplaceTag(_) => "replace_tag",
            Self::XmlSetAttribValueNoCreate(_) => "xml_set_attrib_value_no_create",
            Self::XmlSetTextNoCreate(_) => "xml_set_text_no_create",
            Self::XmlCreateTag(_) => "xml_create_tag",
            Self::XmlDeleteTag(_) => "xml_delete_tag",
            Self::XmlDeleteAtt(_) => "xml_delete_att",
            Self::XmlReplaceTag(_) => "xml_replace_tag",
            Self::SetSpecies(_) => "set_species",
            Self::SetSpeciesLabel(_) => "set_species_label",
            Self::CloneSpecies(_) => "clone_species",
            Self::SetAtomgroup(_) => "set_atomgroup",
            Self::SetAtomgroupLabel(_) => "set_atomgroup_label",
            Self::ShiftValue(_) => "shift_value",
            Self::ShiftValueSpeciesLabel(_) => "shift_value_species_label",
            Self::SetKpointsdata(_) => "set_kpointsdata",
            Self::SwitchKpointset(_) => "switch_kpointset",
            Self::SetNkpts(_) => "set_nkpts",
            Self::SetNmmpmat(_) => "set_nmmpmat",
        }
    }

    /// Side-table key this task dereferences, if any
    #[must_use]
    pub fn node_key(&self) -> Option<&str> {
        match self {
            Self::SetKpointsdata(task) => Some(&task.node),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn positional_arguments_follow_parameter_order() {
        let task = Task::from_parts("set_attrib_value", vec![json!("itmax"), json!(99)], Map::new()).unwrap();
        assert_eq!(task, Task::Xml(XmlTask::SetAttribValue(AttribEdit::new("itmax", 99))));
    }

    #[test]
    fn keyword_arguments_are_accepted() {
        let task = Task::from_parts(
            "set_attrib_value",
            Vec::new(),
            kwargs(json!({"name": "radius", "value": 2.0, "occurrences": [0, 2]})),
        )
        .unwrap();
        let Task::Xml(XmlTask::SetAttribValue(edit)) = task else {
            panic!("wrong task");
        };
        assert_eq!(edit.occurrences, Some(OneOrMany::Many(vec![0, 2])));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = Task::from_parts("doesNotExist", Vec::new(), Map::new()).unwrap_err();
        assert!(matches!(err, FleurinpError::UnknownOperation { name } if name == "doesNotExist"));
    }

    #[test]
    fn malformed_arguments_are_argument_errors() {
        let duplicate = Task::from_parts(
            "del_file",
            vec![json!("relax.xml")],
            kwargs(json!({"filename": "sym.xml"})),
        );
        assert!(matches!(duplicate, Err(FleurinpError::Argument(_))));

        let unknown_kwarg = Task::from_parts("set_nkpts", Vec::new(), kwargs(json!({"count": 4, "nkpts": 4})));
        assert!(matches!(unknown_kwarg, Err(FleurinpError::Argument(_))));

        let too_many = Task::from_parts("switch_kpointset", vec![json!("a"), json!("b")], Map::new());
        assert!(matches!(too_many, Err(FleurinpError::Argument(_))));
    }

    #[test]
    fn parts_roundtrip_without_nulls() {
        let task = Task::Xml(XmlTask::SetFirstAttribValue(AttribEdit::new("Kmax", 4.2)));
        let (name, kwargs) = task.to_parts().unwrap();
        assert_eq!(name, "set_first_attrib_value");
        assert!(!kwargs.contains_key("occurrences"));
        assert_eq!(Task::from_parts(&name, Vec::new(), kwargs).unwrap(), task);
    }

    #[test]
    fn every_variant_has_a_parameter_table() {
        let names: Vec<&str> = task_names().collect();
        for task in [
            Task::File(FileTask::DelFile(DelFile {
                filename: "x".to_string(),
            })),
            Task::Xml(XmlTask::SwitchKpointset(SwitchKpointset {
                list_name: "path".to_string(),
            })),
            Task::Xml(XmlTask::SetNkpts(SetNkpts { count: 4, gamma: false })),
        ] {
            assert!(names.contains(&task.name()));
        }
        assert_eq!(names.len(), 29);
    }
}
