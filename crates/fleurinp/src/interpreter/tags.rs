//! Tag creation, deletion and replacement
//!
//! Handlers that change the structure visit their targets in reverse
//! document order, so removing or inserting at one target never shifts the
//! node path of a target still to be visited.

use super::select::{
    apply_changes, ensure_path, insert_child, node_mut, parse_element, pick, remove_node, replace_node,
    resolve_tag_path, select, select_occurrences,
};
use super::Interpreter;
use crate::error::{FleurinpError, Result};
use crate::task::{
    ComplexTagEdit, SimpleTagEdit, TagCreate, TagReplace, TagSelect, XPathCreate, XPathReplace,
    XPathSelect,
};
use fleurinp_xml::xpath::name_path;
use fleurinp_xml::{Element, NodePath, XMLNode};

fn parent_of(path: &str) -> Result<&str> {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => Ok(parent),
        _ => Err(FleurinpError::argument(format!("'{path}' has no parent element"))),
    }
}

fn is_plain_path(xpath: &str) -> bool {
    xpath.starts_with('/') && !xpath.contains("//") && !xpath.contains(&['[', '*', '@', '(', '.'][..])
}

impl Interpreter<'_> {
    /// Parents at `parent_path`, created if allowed
    fn parents(&self, tree: &mut Element, parent_path: &str, create_parents: bool) -> Result<Vec<NodePath>> {
        let parents = select(tree, parent_path)?;
        if !parents.is_empty() {
            return Ok(parents);
        }
        if !create_parents {
            return Err(FleurinpError::path_not_found(parent_path));
        }
        if !is_plain_path(parent_path) {
            return Err(FleurinpError::argument(format!(
                "parents can only be created along a plain absolute path, not '{parent_path}'"
            )));
        }
        ensure_path(self.schema, tree, parent_path)
    }

    pub(super) fn set_simple_tag(&self, tree: &mut Element, edit: &SimpleTagEdit) -> Result<()> {
        let path = resolve_tag_path(self.schema, tree, &edit.tag_name, &edit.contains, &edit.not_contains)?;
        let parent_path = parent_of(&path)?;
        let mut replacements = Vec::new();
        for changes in edit.changes.to_vec() {
            let mut element = Element::new(&edit.tag_name);
            apply_changes(self.schema, &mut element, &path, &changes, true)?;
            replacements.push(element);
        }
        for parent in self.parents(tree, parent_path, edit.create_parents)?.iter().rev() {
            let element = node_mut(tree, parent)?;
            element
                .children
                .retain(|n| !matches!(n, XMLNode::Element(e) if e.name == edit.tag_name));
            for replacement in &replacements {
                insert_child(self.schema, element, parent_path, replacement.clone());
            }
        }
        Ok(())
    }

    pub(super) fn set_complex_tag(&self, tree: &mut Element, edit: &ComplexTagEdit) -> Result<()> {
        let path = resolve_tag_path(self.schema, tree, &edit.tag_name, &edit.contains, &edit.not_contains)?;
        let mut targets = select(tree, &path)?;
        if targets.is_empty() {
            if !edit.create {
                return Err(FleurinpError::path_not_found(path));
            }
            targets = ensure_path(self.schema, tree, &path)?;
        }
        for target in targets.iter().rev() {
            apply_changes(self.schema, node_mut(tree, target)?, &path, &edit.changes, edit.create)?;
        }
        Ok(())
    }

    pub(super) fn create_tag(&self, tree: &mut Element, edit: &TagCreate) -> Result<()> {
        let element = parse_element(&edit.tag_name)?;
        let path = resolve_tag_path(self.schema, tree, &element.name, &edit.contains, &edit.not_contains)?;
        let parent_path = parent_of(&path)?;
        let parents = self.parents(tree, parent_path, edit.create_parents)?;
        for parent in pick(parents, &edit.occurrences, parent_path)?.iter().rev() {
            insert_child(self.schema, node_mut(tree, parent)?, parent_path, element.clone());
        }
        Ok(())
    }

    pub(super) fn delete_tag(&self, tree: &mut Element, edit: &TagSelect) -> Result<()> {
        let path = resolve_tag_path(self.schema, tree, &edit.tag_name, &edit.contains, &edit.not_contains)?;
        for target in select_occurrences(tree, &path, &edit.occurrences)?.iter().rev() {
            remove_node(tree, target)?;
        }
        Ok(())
    }

    pub(super) fn replace_tag(&self, tree: &mut Element, edit: &TagReplace) -> Result<()> {
        let path = resolve_tag_path(self.schema, tree, &edit.tag_name, &edit.contains, &edit.not_contains)?;
        let element = parse_element(&edit.element)?;
        for target in select_occurrences(tree, &path, &edit.occurrences)? {
            replace_node(tree, &target, element.clone())?;
        }
        Ok(())
    }

    pub(super) fn xml_create_tag(&self, tree: &mut Element, task: &XPathCreate) -> Result<()> {
        let element = parse_element(&task.element)?;
        let parents = self.parents(tree, &task.xpath, task.create_parents)?;
        for parent in pick(parents, &task.occurrences, &task.xpath)?.iter().rev() {
            let parent_path = name_path(tree, parent);
            insert_child(self.schema, node_mut(tree, parent)?, &parent_path, element.clone());
        }
        Ok(())
    }

    pub(super) fn xml_delete_tag(&self, tree: &mut Element, task: &XPathSelect) -> Result<()> {
        for target in select_occurrences(tree, &task.xpath, &task.occurrences)?.iter().rev() {
            remove_node(tree, target)?;
        }
        Ok(())
    }

    pub(super) fn xml_replace_tag(&self, tree: &mut Element, task: &XPathReplace) -> Result<()> {
        let element = parse_element(&task.element)?;
        for target in select_occurrences(tree, &task.xpath, &task.occurrences)? {
            replace_node(tree, &target, element.clone())?;
        }
        Ok(())
    }
}
