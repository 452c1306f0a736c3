//! Species and atom group edits
//!
//! Species are addressed by name, `all`, or `all-<x>` (every species whose
//! name contains `x`). Atoms are addressed by the label of their position
//! tag; the label selects the atom group and through it the species.

use super::attrib::shift_one;
use super::select::{apply_changes, literal, node, node_mut, select, select_from};
use super::Interpreter;
use crate::error::{FleurinpError, Result};
use crate::task::{
    AtomGroupEdit, AtomGroupLabelEdit, CloneSpecies, ShiftValueSpeciesLabel, SpeciesEdit, SpeciesLabelEdit,
};
use fleurinp_xml::{child_elements, Element, NodePath, XMLNode};
use serde_json::{Map, Value};

pub(crate) const SPECIES_PATH: &str = "/fleurInput/atomSpecies/species";
pub(crate) const GROUP_PATH: &str = "/fleurInput/atomGroups/atomGroup";

const POSITION_TAGS: [&str; 3] = ["relPos", "absPos", "filmPos"];

/// Path expression for a species selector
pub(crate) fn species_xpath(selector: &str) -> Result<String> {
    Ok(if selector == "all" {
        SPECIES_PATH.to_string()
    } else if let Some(part) = selector.strip_prefix("all-") {
        format!("{SPECIES_PATH}[contains(@name,{})]", literal(part)?)
    } else {
        format!("{SPECIES_PATH}[@name={}]", literal(selector)?)
    })
}

pub(crate) fn selector_matches(selector: &str, species: &str) -> bool {
    if selector == "all" {
        true
    } else if let Some(part) = selector.strip_prefix("all-") {
        species.contains(part)
    } else {
        species == selector
    }
}

fn has_label(group: &Element, label: &str) -> bool {
    child_elements(group)
        .filter(|e| POSITION_TAGS.contains(&e.name.as_str()))
        .any(|e| e.attributes.get("label").is_some_and(|l| l.trim() == label.trim()))
}

/// Atom groups containing an atom labelled `label` (`all` for every group)
fn groups_with_label(tree: &Element, label: &str) -> Result<Vec<NodePath>> {
    let groups = select(tree, GROUP_PATH)?;
    if label == "all" {
        return Ok(groups);
    }
    let mut found = Vec::new();
    for group in groups {
        if has_label(node(tree, &group)?, label) {
            found.push(group);
        }
    }
    if found.is_empty() {
        return Err(FleurinpError::path_not_found(format!("atom label '{label}'")));
    }
    Ok(found)
}

/// Species selector for the atom labelled `label`
pub(crate) fn species_of_label(tree: &Element, label: &str) -> Result<String> {
    if label == "all" {
        return Ok("all".to_string());
    }
    let group = groups_with_label(tree, label)?.remove(0);
    node(tree, &group)?
        .attributes
        .get("species")
        .cloned()
        .ok_or_else(|| FleurinpError::path_not_found(format!("{GROUP_PATH}/@species")))
}

impl Interpreter<'_> {
    fn edit_species(&self, tree: &mut Element, selector: &str, changes: &Map<String, Value>, create: bool) -> Result<()> {
        let xpath = species_xpath(selector)?;
        let targets = select(tree, &xpath)?;
        if targets.is_empty() {
            return Err(FleurinpError::path_not_found(xpath));
        }
        for target in targets.iter().rev() {
            apply_changes(self.schema, node_mut(tree, target)?, SPECIES_PATH, changes, create)?;
        }
        Ok(())
    }

    pub(super) fn set_species(&self, tree: &mut Element, edit: &SpeciesEdit) -> Result<()> {
        self.edit_species(tree, &edit.species_name, &edit.changes, edit.create)
    }

    pub(super) fn set_species_label(&self, tree: &mut Element, edit: &SpeciesLabelEdit) -> Result<()> {
        let species = species_of_label(tree, &edit.atom_label)?;
        self.edit_species(tree, &species, &edit.changes, edit.create)
    }

    pub(super) fn clone_species(&self, tree: &mut Element, edit: &CloneSpecies) -> Result<()> {
        let all = select(tree, SPECIES_PATH)?;
        let mut source = None;
        for path in &all {
            let name = node(tree, path)?.attributes.get("name").map(String::as_str);
            if name == Some(edit.new_name.as_str()) {
                return Err(FleurinpError::argument(format!("species '{}' already exists", edit.new_name)));
            }
            if name == Some(edit.species_name.as_str()) {
                source = Some(path.clone());
            }
        }
        let source = source.ok_or_else(|| FleurinpError::path_not_found(format!("{SPECIES_PATH} named '{}'", edit.species_name)))?;

        let mut clone = node(tree, &source)?.clone();
        clone.attributes.insert("name".to_string(), edit.new_name.clone());
        if let Some(changes) = &edit.changes {
            apply_changes(self.schema, &mut clone, SPECIES_PATH, changes, true)?;
        }
        let Some((last, parent)) = all.last().and_then(|p| p.split_last()) else {
            return Err(FleurinpError::path_not_found(SPECIES_PATH));
        };
        node_mut(tree, parent)?
            .children
            .insert(last + 1, XMLNode::Element(clone));
        Ok(())
    }

    pub(super) fn set_atomgroup(&self, tree: &mut Element, edit: &AtomGroupEdit) -> Result<()> {
        if edit.position.is_none() && edit.species.is_none() {
            return Err(FleurinpError::argument("set_atomgroup needs a position or a species"));
        }
        let groups = select(tree, GROUP_PATH)?;
        let mut targets = Vec::new();
        if let Some(positions) = &edit.position {
            for position in positions.to_vec() {
                let group = position
                    .checked_sub(1)
                    .and_then(|i| groups.get(i))
                    .ok_or_else(|| {
                        FleurinpError::argument(format!(
                            "atom group position {position} is out of range 1..={}",
                            groups.len()
                        ))
                    })?;
                targets.push(group.clone());
            }
        }
        if let Some(selector) = &edit.species {
            for group in &groups {
                let species = node(tree, group)?.attributes.get("species").map_or("", String::as_str);
                if selector_matches(selector, species) {
                    targets.push(group.clone());
                }
            }
        }
        targets.sort();
        targets.dedup();
        if targets.is_empty() {
            return Err(FleurinpError::path_not_found(GROUP_PATH));
        }
        for target in targets.iter().rev() {
            apply_changes(self.schema, node_mut(tree, target)?, GROUP_PATH, &edit.changes, true)?;
        }
        Ok(())
    }

    pub(super) fn set_atomgroup_label(&self, tree: &mut Element, edit: &AtomGroupLabelEdit) -> Result<()> {
        for target in groups_with_label(tree, &edit.atom_label)?.iter().rev() {
            apply_changes(self.schema, node_mut(tree, target)?, GROUP_PATH, &edit.changes, true)?;
        }
        Ok(())
    }

    pub(super) fn shift_value_species_label(&self, tree: &mut Element, task: &ShiftValueSpeciesLabel) -> Result<()> {
        let paths: Vec<&str> = self
            .schema
            .attribute_paths(&task.name)
            .into_iter()
            .filter(|p| p.starts_with(SPECIES_PATH))
            .collect();
        let path = match paths.as_slice() {
            [path] => *path,
            [] => return Err(FleurinpError::path_not_found(format!("{SPECIES_PATH}//@{}", task.name))),
            _ => {
                return Err(FleurinpError::argument(format!(
                    "species attribute '{}' is ambiguous: {}",
                    task.name,
                    paths.join(", ")
                )))
            }
        };
        let relative = format!(".{}", &path[SPECIES_PATH.len()..]);
        let kind = self.schema.attribute_type(path, &task.name);

        let species = species_of_label(tree, &task.atom_label)?;
        let xpath = species_xpath(&species)?;
        let species_nodes = select(tree, &xpath)?;
        if species_nodes.is_empty() {
            return Err(FleurinpError::path_not_found(xpath));
        }
        for species_node in species_nodes {
            for target in select_from(tree, &relative, &species_node)? {
                let element = node_mut(tree, &target)?;
                let Some(old) = element.attributes.get(&task.name) else {
                    continue;
                };
                let shifted = shift_one(kind, old, task.value, task.mode)
                    .map_err(|e| FleurinpError::argument(format!("{path}/@{}: {e}", task.name)))?;
                element.attributes.insert(task.name.clone(), shifted);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleurinp_xml::parse_xml;

    const INP: &str = r#"<fleurInput fleurInputVersion="0.34">
        <atomSpecies>
            <species name="Fe-1" element="Fe" atomicNumber="26"/>
            <species name="Pt-1" element="Pt" atomicNumber="78"/>
        </atomSpecies>
        <atomGroups>
            <atomGroup species="Fe-1"><relPos label="                 222">1/2 1/2 0</relPos></atomGroup>
            <atomGroup species="Pt-1"><relPos label="  1">0 0 0</relPos></atomGroup>
        </atomGroups>
    </fleurInput>"#;

    #[test]
    fn selectors() {
        assert_eq!(species_xpath("all").unwrap(), SPECIES_PATH);
        assert_eq!(
            species_xpath("all-Fe").unwrap(),
            "/fleurInput/atomSpecies/species[contains(@name,'Fe')]"
        );
        assert_eq!(
            species_xpath("O'x").unwrap(),
            r#"/fleurInput/atomSpecies/species[@name="O'x"]"#
        );
        assert!(matches!(species_xpath(r#"a'b"c"#), Err(FleurinpError::Argument(_))));
        assert!(selector_matches("all-Pt", "Pt-1"));
        assert!(!selector_matches("Fe-1", "Fe-2"));
    }

    #[test]
    fn labels_are_compared_trimmed() {
        let tree = parse_xml("inp.xml", INP.as_bytes()).unwrap();
        assert_eq!(species_of_label(&tree, "222").unwrap(), "Fe-1");
        assert_eq!(species_of_label(&tree, "1").unwrap(), "Pt-1");
        assert!(matches!(
            species_of_label(&tree, "7"),
            Err(FleurinpError::PathNotFound { .. })
        ));
    }
}
