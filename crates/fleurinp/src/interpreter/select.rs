//! Target selection and structural helpers shared by the task handlers

use crate::error::{FleurinpError, Result};
use crate::task::{Occurrences, PathFilter};
use fleurinp_xml::xpath::{descendants, element_at, element_at_mut, name_path};
use fleurinp_xml::{parse_xml, quote_literal, set_text, Element, NodePath, Schema, XMLNode, XPath};
use serde_json::{Map, Value};

/// Elements matched by `xpath`, in document order
pub(crate) fn select(tree: &Element, xpath: &str) -> Result<Vec<NodePath>> {
    select_from(tree, xpath, &[])
}

/// A name as a predicate literal
pub(crate) fn literal(value: &str) -> Result<String> {
    quote_literal(value).map_err(|e| FleurinpError::argument(e.to_string()))
}

/// Elements matched by `xpath` relative to `context`
pub(crate) fn select_from(tree: &Element, xpath: &str, context: &[usize]) -> Result<Vec<NodePath>> {
    let xpath = XPath::parse(xpath).map_err(|e| FleurinpError::argument(e.to_string()))?;
    Ok(xpath.select_from(tree, context))
}

/// Keep the matches named by `occurrences`
///
/// Negative indices count from the end. The result is in document order
/// without duplicates.
pub(crate) fn pick(matches: Vec<NodePath>, occurrences: &Occurrences, what: &str) -> Result<Vec<NodePath>> {
    let Some(occurrences) = occurrences else {
        return Ok(matches);
    };
    let len = matches.len() as i64;
    let mut picked = Vec::new();
    for index in occurrences.to_vec() {
        let resolved = if index < 0 { len + index } else { index };
        if !(0..len).contains(&resolved) {
            return Err(FleurinpError::argument(format!(
                "occurrence {index} is out of range: {len} element(s) match '{what}'"
            )));
        }
        picked.push(matches[resolved as usize].clone());
    }
    picked.sort();
    picked.dedup();
    Ok(picked)
}

/// [`select`] followed by [`pick`]; no match at all is [`FleurinpError::PathNotFound`]
pub(crate) fn select_occurrences(tree: &Element, xpath: &str, occurrences: &Occurrences) -> Result<Vec<NodePath>> {
    let matches = select(tree, xpath)?;
    if matches.is_empty() {
        return Err(FleurinpError::path_not_found(xpath));
    }
    pick(matches, occurrences, xpath)
}

pub(crate) fn node<'a>(tree: &'a Element, path: &[usize]) -> Result<&'a Element> {
    element_at(tree, path).ok_or_else(|| FleurinpError::path_not_found(format!("{path:?}")))
}

pub(crate) fn node_mut<'a>(tree: &'a mut Element, path: &[usize]) -> Result<&'a mut Element> {
    element_at_mut(tree, path).ok_or_else(|| FleurinpError::path_not_found(format!("{path:?}")))
}

fn matches_filters(path: &str, contains: &PathFilter, not_contains: &PathFilter) -> bool {
    let required = contains.as_ref().map(|c| c.to_vec()).unwrap_or_default();
    let excluded = not_contains.as_ref().map(|c| c.to_vec()).unwrap_or_default();
    required.iter().all(|s| path.contains(s.as_str())) && !excluded.iter().any(|s| path.contains(s.as_str()))
}

/// Name paths of every element in the tree satisfying `keep`
fn tree_paths(tree: &Element, keep: impl Fn(&Element) -> bool) -> Vec<String> {
    let mut paths: Vec<String> = std::iter::once(Vec::new())
        .chain(descendants(tree, &[]))
        .filter(|p| element_at(tree, p).is_some_and(&keep))
        .map(|p| name_path(tree, &p))
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

fn unique(name: &str, candidates: Vec<String>, contains: &PathFilter, not_contains: &PathFilter) -> Result<String> {
    let mut remaining: Vec<String> = candidates
        .into_iter()
        .filter(|p| matches_filters(p, contains, not_contains))
        .collect();
    match remaining.len() {
        0 => Err(FleurinpError::path_not_found(name)),
        1 => Ok(remaining.remove(0)),
        _ => Err(FleurinpError::argument(format!(
            "'{name}' is ambiguous, it may refer to {}; restrict it with contains/not_contains",
            remaining.join(", ")
        ))),
    }
}

fn ends_with_tag(path: &str, tag: &str) -> bool {
    path.rsplit('/').next() == Some(tag)
}

/// Unique name path of the elements called `tag`
pub(crate) fn resolve_tag_path(
    schema: &Schema,
    tree: &Element,
    tag: &str,
    contains: &PathFilter,
    not_contains: &PathFilter,
) -> Result<String> {
    let mut candidates: Vec<String> = schema.tag_paths(tag).into_iter().map(str::to_string).collect();
    if candidates.is_empty() {
        candidates = tree_paths(tree, |e| e.name == tag);
    }
    unique(tag, candidates, contains, not_contains)
}

/// Unique name path of the elements carrying attribute `name`
pub(crate) fn resolve_attrib_path(
    schema: &Schema,
    tree: &Element,
    name: &str,
    tag: Option<&str>,
    contains: &PathFilter,
    not_contains: &PathFilter,
) -> Result<String> {
    let mut candidates: Vec<String> = schema.attribute_paths(name).into_iter().map(str::to_string).collect();
    if candidates.is_empty() {
        candidates = tree_paths(tree, |e| e.attributes.contains_key(name));
    }
    if let Some(tag) = tag {
        candidates.retain(|p| ends_with_tag(p, tag));
    }
    unique(name, candidates, contains, not_contains)
}

/// Unique name path of the text tags called `name`
pub(crate) fn resolve_text_path(
    schema: &Schema,
    name: &str,
    contains: &PathFilter,
    not_contains: &PathFilter,
) -> Result<String> {
    let candidates = schema.text_paths(name).into_iter().map(str::to_string).collect();
    unique(name, candidates, contains, not_contains)
}

/// Attribute or text representation of a JSON value
///
/// Booleans become the `T`/`F` switches of the input format; lists become
/// space separated vectors.
pub(crate) fn format_value(value: &Value) -> Result<String> {
    match value {
        Value::Bool(true) => Ok("T".to_string()),
        Value::Bool(false) => Ok("F".to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => Ok(items.iter().map(format_value).collect::<Result<Vec<_>>>()?.join(" ")),
        Value::Null | Value::Object(_) => Err(FleurinpError::argument(format!(
            "{value} cannot be written as an attribute or text value"
        ))),
    }
}

/// One formatted value per target
///
/// A list must provide exactly one value per target; any other value is used
/// for all of them.
pub(crate) fn values_for(value: &Value, targets: usize, what: &str) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => {
            if items.len() != targets {
                return Err(FleurinpError::argument(format!(
                    "{} value(s) given for {targets} occurrence(s) of '{what}'",
                    items.len()
                )));
            }
            items.iter().map(format_value).collect()
        }
        other => Ok(vec![format_value(other)?; targets]),
    }
}

/// Element from a tag name or an XML snippet
pub(crate) fn parse_element(source: &str) -> Result<Element> {
    let source = source.trim();
    if source.starts_with('<') {
        return parse_xml("element", source.as_bytes()).map_err(|e| FleurinpError::argument(e.to_string()));
    }
    if source.is_empty() || source.contains(|c: char| c.is_whitespace() || matches!(c, '/' | '<' | '>')) {
        return Err(FleurinpError::argument(format!("'{source}' is not a tag name")));
    }
    Ok(Element::new(source))
}

/// Insert `child` into `parent` at its schema position; returns its index
///
/// Children not ordered by the schema are appended.
pub(crate) fn insert_child(schema: &Schema, parent: &mut Element, parent_path: &str, child: Element) -> usize {
    let rank = |name: &str| {
        schema
            .child_order(parent_path)
            .and_then(|order| order.iter().position(|n| n == name))
    };
    let index = rank(&child.name)
        .and_then(|own| {
            parent.children.iter().position(|node| match node {
                XMLNode::Element(e) => rank(&e.name).is_some_and(|r| r > own),
                _ => false,
            })
        })
        .unwrap_or(parent.children.len());
    parent.children.insert(index, XMLNode::Element(child));
    index
}

/// Every element at `path`, creating the missing part of the chain
pub(crate) fn ensure_path(schema: &Schema, tree: &mut Element, path: &str) -> Result<Vec<NodePath>> {
    let mut names = path.trim_start_matches('/').split('/');
    if names.next() != Some(tree.name.as_str()) {
        return Err(FleurinpError::path_not_found(path));
    }
    let mut current: Vec<NodePath> = vec![Vec::new()];
    let mut current_path = format!("/{}", tree.name);
    for name in names {
        let mut next = Vec::new();
        for parent_path in &current {
            let parent = node_mut(tree, parent_path)?;
            let existing: Vec<usize> = parent
                .children
                .iter()
                .enumerate()
                .filter(|(_, n)| matches!(n, XMLNode::Element(e) if e.name == name))
                .map(|(i, _)| i)
                .collect();
            let indices = if existing.is_empty() {
                tracing::debug!(path = %format!("{current_path}/{name}"), "creating missing element");
                vec![insert_child(schema, parent, &current_path, Element::new(name))]
            } else {
                existing
            };
            for index in indices {
                let mut child = parent_path.clone();
                child.push(index);
                next.push(child);
            }
        }
        current = next;
        current_path = format!("{current_path}/{name}");
    }
    Ok(current)
}

/// Remove the element at `path`
pub(crate) fn remove_node(tree: &mut Element, path: &[usize]) -> Result<Element> {
    let Some((index, parent)) = path.split_last() else {
        return Err(FleurinpError::argument("the root element cannot be removed"));
    };
    let parent = node_mut(tree, parent)?;
    match parent.children.remove(*index) {
        XMLNode::Element(e) => Ok(e),
        _ => Err(FleurinpError::path_not_found(format!("{path:?}"))),
    }
}

/// Put `element` in place of the element at `path`
pub(crate) fn replace_node(tree: &mut Element, path: &[usize], element: Element) -> Result<()> {
    let Some((index, parent)) = path.split_last() else {
        *tree = element;
        return Ok(());
    };
    node_mut(tree, parent)?.children[*index] = XMLNode::Element(element);
    Ok(())
}

/// Whether `{path}/{name}` is declared as a text tag
fn is_text_tag(schema: &Schema, path: &str, name: &str) -> bool {
    schema
        .element(&format!("{path}/{name}"))
        .is_some_and(|spec| spec.text.is_some())
}

fn child_indices(element: &Element, name: &str) -> Vec<usize> {
    element
        .children
        .iter()
        .enumerate()
        .filter(|(_, n)| matches!(n, XMLNode::Element(e) if e.name == name))
        .map(|(i, _)| i)
        .collect()
}

fn child_at(element: &mut Element, index: usize) -> Option<&mut Element> {
    match element.children.get_mut(index) {
        Some(XMLNode::Element(e)) => Some(e),
        _ => None,
    }
}

/// Apply nested changes to `element` (located at name path `path`)
///
/// - a mapping edits the child of that name (created when `create` is set)
/// - a list of mappings replaces every child of that name
/// - anything else sets the text of a text tag, or an attribute
pub(crate) fn apply_changes(
    schema: &Schema,
    element: &mut Element,
    path: &str,
    changes: &Map<String, Value>,
    create: bool,
) -> Result<()> {
    for (key, value) in changes {
        let child_path = format!("{path}/{key}");
        match value {
            Value::Object(nested) => {
                let mut indices = child_indices(element, key);
                if indices.is_empty() {
                    if !create {
                        return Err(FleurinpError::path_not_found(child_path));
                    }
                    indices.push(insert_child(schema, element, path, Element::new(key)));
                }
                for index in indices {
                    if let Some(child) = child_at(element, index) {
                        apply_changes(schema, child, &child_path, nested, create)?;
                    }
                }
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                for index in child_indices(element, key).into_iter().rev() {
                    element.children.remove(index);
                }
                for item in items {
                    let mut child = Element::new(key);
                    if let Value::Object(nested) = item {
                        apply_changes(schema, &mut child, &child_path, nested, true)?;
                    }
                    insert_child(schema, element, path, child);
                }
            }
            scalar if is_text_tag(schema, path, key) => {
                let text = format_value(scalar)?;
                let mut indices = child_indices(element, key);
                if indices.is_empty() {
                    if !create {
                        return Err(FleurinpError::path_not_found(child_path));
                    }
                    indices.push(insert_child(schema, element, path, Element::new(key)));
                }
                for index in indices {
                    if let Some(child) = child_at(element, index) {
                        set_text(child, &text);
                    }
                }
            }
            scalar => {
                element.attributes.insert(key.clone(), format_value(scalar)?);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::OneOrMany;
    use fleurinp_xml::{BuiltinSchemas, SchemaRegistry};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const INP: &str = r#"<fleurInput fleurInputVersion="0.34">
        <calculationSetup><scfLoop itmax="9"/></calculationSetup>
        <atomSpecies>
            <species name="Fe-1" element="Fe" atomicNumber="26"><mtSphere radius="2.2" gridPoints="787" logIncrement=".016"/></species>
            <species name="Pt-1" element="Pt" atomicNumber="78"><mtSphere radius="2.3" gridPoints="787" logIncrement=".016"/></species>
            <species name="Fe-2" element="Fe" atomicNumber="26"><mtSphere radius="2.2" gridPoints="787" logIncrement=".016"/></species>
        </atomSpecies>
    </fleurInput>"#;

    fn tree() -> Element {
        parse_xml("inp.xml", INP.as_bytes()).unwrap()
    }

    fn schema() -> std::sync::Arc<Schema> {
        BuiltinSchemas::new().unwrap().load("0.34").unwrap()
    }

    #[test]
    fn occurrences_pick_in_document_order() {
        let matches = select(&tree(), "//mtSphere").unwrap();
        let picked = pick(matches.clone(), &Some(OneOrMany::Many(vec![2, 0])), "mtSphere").unwrap();
        assert_eq!(picked, vec![matches[0].clone(), matches[2].clone()]);
        let last = pick(matches.clone(), &Some(OneOrMany::One(-1)), "mtSphere").unwrap();
        assert_eq!(last, vec![matches[2].clone()]);
        assert!(matches!(
            pick(matches, &Some(OneOrMany::One(3)), "mtSphere"),
            Err(FleurinpError::Argument(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_picked_matches_stay_in_document_order(
            len in 1..12usize,
            raw in proptest::collection::vec(0..24i64, 1..8),
        ) {
            let matches: Vec<NodePath> = (0..len).map(|i| vec![i]).collect();
            // map into -len..len so both index forms occur
            let indices: Vec<i64> = raw.iter().map(|r| r % (2 * len as i64) - len as i64).collect();
            let picked = pick(matches, &Some(OneOrMany::Many(indices.clone())), "x").unwrap();

            let mut expected: Vec<usize> = indices
                .iter()
                .map(|i| if *i < 0 { (len as i64 + i) as usize } else { *i as usize })
                .collect();
            expected.sort_unstable();
            expected.dedup();
            proptest::prop_assert_eq!(picked, expected.into_iter().map(|i| vec![i]).collect::<Vec<_>>());
        }
    }

    #[test]
    fn names_resolve_through_the_schema() {
        let tree = tree();
        let schema = schema();
        assert_eq!(
            resolve_attrib_path(&schema, &tree, "itmax", None, &None, &None).unwrap(),
            "/fleurInput/calculationSetup/scfLoop"
        );
        assert!(matches!(
            resolve_attrib_path(&schema, &tree, "doesNotExist", None, &None, &None),
            Err(FleurinpError::PathNotFound { .. })
        ));
        assert!(matches!(
            resolve_attrib_path(&schema, &tree, "label", None, &None, &None),
            Err(FleurinpError::Argument(_))
        ));
        assert_eq!(
            resolve_attrib_path(&schema, &tree, "label", None, &Some("relPos".into()), &None).unwrap(),
            "/fleurInput/atomGroups/atomGroup/relPos"
        );
    }

    #[test]
    fn values_are_formatted_for_the_input_format() {
        assert_eq!(format_value(&json!(true)).unwrap(), "T");
        assert_eq!(format_value(&json!([0.5, 0, 1])).unwrap(), "0.5 0 1");
        assert!(format_value(&json!(null)).is_err());
        assert_eq!(values_for(&json!(3), 2, "x").unwrap(), vec!["3", "3"]);
        assert!(matches!(values_for(&json!([1, 2]), 3, "x"), Err(FleurinpError::Argument(_))));
    }

    #[test]
    fn missing_parents_are_created_in_schema_order() {
        let mut tree = tree();
        let schema = schema();
        let created = ensure_path(&schema, &mut tree, "/fleurInput/calculationSetup/cutoffs").unwrap();
        assert_eq!(created.len(), 1);
        let setup = node(&tree, &created[0][..1]).unwrap();
        let names: Vec<&str> = fleurinp_xml::child_elements(setup).map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["cutoffs", "scfLoop"]);
    }

    #[test]
    fn nested_changes_reach_children() {
        let mut tree = tree();
        let schema = schema();
        let species = select(&tree, "/fleurInput/atomSpecies/species[@name='Pt-1']").unwrap();
        let element = node_mut(&mut tree, &species[0]).unwrap();
        let changes = json!({"mtSphere": {"radius": 2.5}, "lo": [{"type": "SCLO", "l": 1, "n": 5}]});
        apply_changes(&schema, element, "/fleurInput/atomSpecies/species", changes.as_object().unwrap(), true).unwrap();
        let updated = node(&tree, &species[0]).unwrap();
        let sphere = updated.get_child("mtSphere").unwrap();
        assert_eq!(sphere.attributes.get("radius").map(String::as_str), Some("2.5"));
        assert_eq!(updated.get_child("lo").unwrap().attributes.get("l").map(String::as_str), Some("1"));
    }

    #[test]
    fn snippets_and_names_become_elements() {
        let element = parse_element("<lo type=\"SCLO\" l=\"0\"/>").unwrap();
        assert_eq!(element.name, "lo");
        assert_eq!(parse_element("cutoffs").unwrap().name, "cutoffs");
        assert!(parse_element("two words").is_err());
    }
}
