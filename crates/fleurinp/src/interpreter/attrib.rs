//! Attribute and text edits

use super::select::{
    ensure_path, format_value, node_mut, pick, resolve_attrib_path, resolve_text_path, select,
    select_occurrences, values_for,
};
use super::Interpreter;
use crate::error::{FleurinpError, Result};
use crate::task::{
    AttribDelete, AttribEdit, OneOrMany, SetInpchanges, ShiftMode, ShiftValue, TextEdit,
    XPathAttrib, XPathAttribDelete, XPathText,
};
use fleurinp_xml::{set_text, Element, NodePath, ValueType};

impl Interpreter<'_> {
    /// Existing matches of `path`, or the freshly created chain when allowed
    fn targets(&self, tree: &mut Element, path: &str, create: bool, what: &str) -> Result<Vec<NodePath>> {
        let matches = select(tree, path)?;
        if !matches.is_empty() {
            return Ok(matches);
        }
        if create {
            return ensure_path(self.schema, tree, path);
        }
        Err(FleurinpError::path_not_found(format!("{path}/{what}")))
    }

    pub(super) fn set_attrib_value(&self, tree: &mut Element, edit: &AttribEdit, first: bool) -> Result<()> {
        let path = resolve_attrib_path(self.schema, tree, &edit.name, None, &edit.contains, &edit.not_contains)?;
        let occurrences = if first { Some(OneOrMany::One(0)) } else { edit.occurrences.clone() };
        let matches = self.targets(tree, &path, edit.create, &format!("@{}", edit.name))?;
        let targets = pick(matches, &occurrences, &path)?;
        let values = values_for(&edit.value, targets.len(), &edit.name)?;
        for (target, value) in targets.iter().zip(values) {
            node_mut(tree, target)?.attributes.insert(edit.name.clone(), value);
        }
        Ok(())
    }

    pub(super) fn set_text(&self, tree: &mut Element, edit: &TextEdit) -> Result<()> {
        let path = resolve_text_path(self.schema, &edit.name, &edit.contains, &edit.not_contains)?;
        let matches = self.targets(tree, &path, edit.create, "text()")?;
        let targets = pick(matches, &edit.occurrences, &path)?;
        let values = values_for(&edit.text, targets.len(), &edit.name)?;
        for (target, text) in targets.iter().zip(values) {
            set_text(node_mut(tree, target)?, &text);
        }
        Ok(())
    }

    /// Each key is an attribute name, or failing that a text tag name
    pub(super) fn set_inpchanges(&self, tree: &mut Element, task: &SetInpchanges) -> Result<()> {
        for (key, value) in &task.changes {
            let formatted = format_value(value)?;
            match resolve_attrib_path(self.schema, tree, key, None, &None, &None) {
                Ok(path) => {
                    for target in self.targets(tree, &path, true, key)? {
                        node_mut(tree, &target)?.attributes.insert(key.clone(), formatted.clone());
                    }
                    continue;
                }
                Err(FleurinpError::PathNotFound { .. }) => {}
                Err(other) => return Err(other),
            }
            match resolve_text_path(self.schema, key, &None, &None) {
                Ok(path) => {
                    for target in self.targets(tree, &path, true, key)? {
                        set_text(node_mut(tree, &target)?, &formatted);
                    }
                }
                Err(FleurinpError::PathNotFound { .. }) => {
                    return Err(FleurinpError::argument(format!(
                        "'{key}' is neither an attribute nor a text tag of the input"
                    )))
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    pub(super) fn delete_att(&self, tree: &mut Element, edit: &AttribDelete) -> Result<()> {
        let path = resolve_attrib_path(
            self.schema,
            tree,
            &edit.name,
            edit.tag_name.as_deref(),
            &edit.contains,
            &edit.not_contains,
        )?;
        let carrying = format!("{path}[@{}]", edit.name);
        for target in select_occurrences(tree, &carrying, &edit.occurrences)? {
            node_mut(tree, &target)?.attributes.shift_remove(&edit.name);
        }
        Ok(())
    }

    pub(super) fn shift_value(&self, tree: &mut Element, task: &ShiftValue) -> Result<()> {
        for (name, change) in &task.changes {
            let path = resolve_attrib_path(self.schema, tree, name, None, &task.contains, &task.not_contains)?;
            let kind = self.schema.attribute_type(&path, name);
            let carrying = format!("{path}[@{name}]");
            for target in select_occurrences(tree, &carrying, &task.occurrences)? {
                let element = node_mut(tree, &target)?;
                let old = element
                    .attributes
                    .get(name)
                    .ok_or_else(|| FleurinpError::path_not_found(format!("{path}/@{name}")))?;
                let shifted = shift_one(kind, old, *change, task.mode)
                    .map_err(|e| FleurinpError::argument(format!("{path}/@{name}: {e}")))?;
                element.attributes.insert(name.clone(), shifted);
            }
        }
        Ok(())
    }

    pub(super) fn xml_set_attrib_value(&self, tree: &mut Element, task: &XPathAttrib) -> Result<()> {
        let targets = select_occurrences(tree, &task.xpath, &task.occurrences)?;
        let values = values_for(&task.value, targets.len(), &task.name)?;
        for (target, value) in targets.iter().zip(values) {
            node_mut(tree, target)?.attributes.insert(task.name.clone(), value);
        }
        Ok(())
    }

    pub(super) fn xml_set_text(&self, tree: &mut Element, task: &XPathText) -> Result<()> {
        let targets = select_occurrences(tree, &task.xpath, &task.occurrences)?;
        let values = values_for(&task.text, targets.len(), &task.xpath)?;
        for (target, text) in targets.iter().zip(values) {
            set_text(node_mut(tree, target)?, &text);
        }
        Ok(())
    }

    pub(super) fn xml_delete_att(&self, tree: &mut Element, task: &XPathAttribDelete) -> Result<()> {
        for target in select_occurrences(tree, &task.xpath, &task.occurrences)? {
            node_mut(tree, &target)?.attributes.shift_remove(&task.name);
        }
        Ok(())
    }
}

/// New value of a numeric attribute
///
/// Integer attributes stay integers; a shift that would make them fractional
/// is rejected.
pub(crate) fn shift_one(
    kind: Option<ValueType>,
    old: &str,
    change: f64,
    mode: ShiftMode,
) -> std::result::Result<String, String> {
    let current: f64 = old
        .trim()
        .parse()
        .map_err(|_| format!("value '{old}' is not numeric"))?;
    let shifted = match mode {
        ShiftMode::Abs => current + change,
        ShiftMode::Rel => current * change,
    };
    let integral = match kind {
        Some(ValueType::Int) => true,
        Some(_) => false,
        None => old.trim().parse::<i64>().is_ok(),
    };
    if integral {
        if shifted.fract() != 0.0 {
            return Err(format!("integer value {old} cannot become {shifted}"));
        }
        return Ok(format!("{}", shifted as i64));
    }
    Ok(format!("{shifted:.10}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_shifts_stay_integral() {
        assert_eq!(shift_one(Some(ValueType::Int), "9", 1.0, ShiftMode::Abs).unwrap(), "10");
        assert_eq!(shift_one(Some(ValueType::Int), "9", 2.0, ShiftMode::Rel).unwrap(), "18");
        assert!(shift_one(Some(ValueType::Int), "9", 0.5, ShiftMode::Abs).is_err());
    }

    #[test]
    fn float_shifts_keep_precision() {
        assert_eq!(shift_one(Some(ValueType::Float), "2.2", 0.1, ShiftMode::Abs).unwrap(), "2.3000000000");
        assert_eq!(shift_one(None, "4.0", 0.5, ShiftMode::Rel).unwrap(), "2.0000000000");
    }

    #[test]
    fn non_numeric_values_cannot_shift() {
        assert!(shift_one(None, "T", 1.0, ShiftMode::Abs).is_err());
    }
}
