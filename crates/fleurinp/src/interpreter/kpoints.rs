//! Brillouin zone sampling edits
//!
//! Two layouts exist. Older decks keep a single k-point specification
//! (`kPointMesh`, `kPointCount` or `kPointList`) directly in
//! `calculationSetup/bzIntegration`; newer decks keep any number of named
//! lists under `cell/bzIntegration/kPointLists` and select one of them.

use super::select::{ensure_path, insert_child, literal, node_mut, select};
use super::{AuxNode, Interpreter};
use crate::error::{FleurinpError, Result};
use crate::kpoints::KpointsData;
use crate::task::{SetKpointsdata, SetNkpts, SwitchKpointset};
use fleurinp_xml::{set_text, Element, XMLNode};

const NAMED_BZ: &str = "/fleurInput/cell/bzIntegration";
const NAMED_LISTS: &str = "/fleurInput/cell/bzIntegration/kPointLists";
const NAMED_SELECTION: &str = "/fleurInput/cell/bzIntegration/kPointListSelection";
const SINGLE_BZ: &str = "/fleurInput/calculationSetup/bzIntegration";
const SINGLE_KINDS: [&str; 3] = ["kPointMesh", "kPointCount", "kPointList"];

fn kpoint_elements(kpoints: &KpointsData) -> Vec<Element> {
    kpoints
        .points()
        .iter()
        .zip(kpoints.weights())
        .map(|(point, weight)| {
            let mut element = Element::new("kPoint");
            element.attributes.insert("weight".to_string(), format!("{weight:.13}"));
            set_text(
                &mut element,
                &format!("{:.13} {:.13} {:.13}", point[0], point[1], point[2]),
            );
            element
        })
        .collect()
}

fn with_children(mut element: Element, children: Vec<Element>) -> Element {
    element.children.extend(children.into_iter().map(XMLNode::Element));
    element
}

impl Interpreter<'_> {
    fn has_named_lists(&self) -> bool {
        self.schema.element(NAMED_LISTS).is_some()
    }

    fn kpoints_node(&self, key: &str) -> Result<&KpointsData> {
        match self.nodes.get(key) {
            Some(AuxNode::Kpoints(kpoints)) => Ok(kpoints),
            Some(AuxNode::Fleurinp(_)) => Err(FleurinpError::argument(format!(
                "node '{key}' is an input deck, not a k-point set"
            ))),
            None => Err(FleurinpError::MissingNode(key.to_string())),
        }
    }

    /// The single `bzIntegration` element of the deck
    fn bz_integration(tree: &Element, path: &str) -> Result<Vec<usize>> {
        select(tree, path)?
            .into_iter()
            .next()
            .ok_or_else(|| FleurinpError::path_not_found(path))
    }

    fn select_list(&self, tree: &mut Element, name: &str) -> Result<()> {
        for selection in ensure_path(self.schema, tree, NAMED_SELECTION)? {
            node_mut(tree, &selection)?
                .attributes
                .insert("listName".to_string(), name.to_string());
        }
        Ok(())
    }

    pub(super) fn set_kpointsdata(&self, tree: &mut Element, task: &SetKpointsdata) -> Result<()> {
        let kpoints = self.kpoints_node(&task.node)?;
        let points = kpoint_elements(kpoints);

        if !self.has_named_lists() {
            if task.name.is_some() {
                tracing::warn!("k-point list names need the named list layout; ignoring the name");
            }
            let bz = Self::bz_integration(tree, SINGLE_BZ)?;
            let element = node_mut(tree, &bz)?;
            element
                .children
                .retain(|n| !matches!(n, XMLNode::Element(e) if SINGLE_KINDS.contains(&e.name.as_str())));
            let mut list = Element::new("kPointList");
            list.attributes.insert("posScale".to_string(), "1.0".to_string());
            list.attributes.insert("weightScale".to_string(), "1.0".to_string());
            list.attributes.insert("count".to_string(), kpoints.len().to_string());
            insert_child(self.schema, element, SINGLE_BZ, with_children(list, points));
            return Ok(());
        }

        Self::bz_integration(tree, NAMED_BZ)?;
        let lists = ensure_path(self.schema, tree, NAMED_LISTS)?;
        let lists_element = node_mut(tree, &lists[0])?;
        let existing: Vec<(usize, String)> = lists_element
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                XMLNode::Element(e) if e.name == "kPointList" => {
                    Some((i, e.attributes.get("name").cloned().unwrap_or_default()))
                }
                _ => None,
            })
            .collect();
        let name = task
            .name
            .clone()
            .unwrap_or_else(|| format!("default-{}", existing.len() + 1));

        let mut list = Element::new("kPointList");
        list.attributes.insert("name".to_string(), name.clone());
        list.attributes.insert("count".to_string(), kpoints.len().to_string());
        list.attributes.insert("type".to_string(), "unspecified".to_string());
        let list = with_children(list, points);

        match existing.iter().find(|(_, n)| *n == name) {
            Some((index, _)) => lists_element.children[*index] = XMLNode::Element(list),
            None => {
                insert_child(self.schema, lists_element, NAMED_LISTS, list);
            }
        }
        if task.switch {
            self.select_list(tree, &name)?;
        }
        Ok(())
    }

    pub(super) fn switch_kpointset(&self, tree: &mut Element, task: &SwitchKpointset) -> Result<()> {
        if !self.has_named_lists() {
            return Err(FleurinpError::argument(format!(
                "switch_kpointset needs named k-point lists, which format {} does not have",
                self.schema.version()
            )));
        }
        let xpath = format!("{NAMED_LISTS}/kPointList[@name={}]", literal(&task.list_name)?);
        if select(tree, &xpath)?.is_empty() {
            return Err(FleurinpError::path_not_found(xpath));
        }
        self.select_list(tree, &task.list_name)
    }

    pub(super) fn set_nkpts(&self, tree: &mut Element, task: &SetNkpts) -> Result<()> {
        if self.has_named_lists() {
            return Err(FleurinpError::argument(format!(
                "set_nkpts is not available for format {}; use set_kpointsdata",
                self.schema.version()
            )));
        }
        let bz = Self::bz_integration(tree, SINGLE_BZ)?;
        let element = node_mut(tree, &bz)?;
        element
            .children
            .retain(|n| !matches!(n, XMLNode::Element(e) if SINGLE_KINDS.contains(&e.name.as_str())));
        let mut count = Element::new("kPointCount");
        count.attributes.insert("count".to_string(), task.count.to_string());
        count
            .attributes
            .insert("gamma".to_string(), if task.gamma { "T" } else { "F" }.to_string());
        insert_child(self.schema, element, SINGLE_BZ, count);
        Ok(())
    }
}
