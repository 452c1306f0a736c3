//! `xi:include` expansion and its inverse
//!
//! Input decks may be split over several files (`sym.xml`, `kpts.xml`,
//! `relax.xml`) that `inp.xml` pulls in with XInclude. Editing works on one
//! combined tree, so includes are inlined after loading and split back out
//! before the result is persisted.

use crate::document::{parse_file, FileSource};
use crate::error::XmlError;
use crate::xpath::{descendants, element_at, name_path, NodePath, XPath};
use std::collections::BTreeMap;
use xmltree::{Element, XMLNode};

/// Namespace of XInclude elements
pub const XINCLUDE_NAMESPACE: &str = "http://www.w3.org/2001/XInclude";

/// One inlined file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedFile {
    /// Filename of the included document
    pub file: String,
    /// Name path of the inlined root element in the combined tree
    pub location: String,
    /// The include element it replaced, restored on split
    pub include: Element,
}

/// Record of every include substituted into a combined tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeMap {
    entries: Vec<IncludedFile>,
}

impl IncludeMap {
    /// Whether no include was inlined
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of inlined files
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Names of the inlined files, in document order
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.file.as_str())
    }

    /// Entry for one file
    #[must_use]
    pub fn get(&self, file: &str) -> Option<&IncludedFile> {
        self.entries.iter().find(|e| e.file == file)
    }
}

fn is_include(element: &Element) -> bool {
    element.name == "include"
        && (element.namespace.as_deref() == Some(XINCLUDE_NAMESPACE)
            || element.prefix.as_deref() == Some("xi"))
}

fn href(element: &Element) -> Option<&str> {
    element.attributes.get("href").map(String::as_str)
}

/// Substitute every include whose target is in `files` with the target's root
///
/// Includes pointing at files outside the set are left untouched, so their
/// fallback content stays available to the consumer.
///
/// # Errors
/// [`XmlError::Malformed`] if an included file does not parse
pub fn inline_includes(tree: &mut Element, files: &impl FileSource) -> Result<IncludeMap, XmlError> {
    let targets: Vec<(NodePath, String)> = descendants(tree, &[])
        .into_iter()
        .filter_map(|path| {
            let element = element_at(tree, &path)?;
            if !is_include(element) {
                return None;
            }
            let file = href(element)?;
            files.has_file(file).then(|| (path, file.to_string()))
        })
        .collect();

    let mut map = IncludeMap::default();
    for (path, file) in targets {
        let included = parse_file(files, &file)?;
        let Some((index, parent)) = path.split_last() else {
            continue;
        };
        let Some(parent_element) = crate::xpath::element_at_mut(tree, parent) else {
            continue;
        };
        let original = std::mem::replace(
            &mut parent_element.children[*index],
            XMLNode::Element(included),
        );
        let XMLNode::Element(include) = original else {
            continue;
        };
        let location = name_path(tree, &path);
        tracing::debug!(file = %file, location = %location, "inlined include");
        map.entries.push(IncludedFile {
            file,
            location,
            include,
        });
    }
    Ok(map)
}

/// Split a combined tree back into the primary tree and the included trees
///
/// An included subtree that no longer exists (deleted by an edit) drops its
/// file from the result.
///
/// # Errors
/// [`XmlError::InvalidPath`] if a recorded location is not a valid path
pub fn split_includes(
    tree: &Element,
    includes: &IncludeMap,
) -> Result<(Element, BTreeMap<String, Element>), XmlError> {
    let mut primary = tree.clone();
    let mut split = BTreeMap::new();
    for entry in &includes.entries {
        let matches = XPath::parse(&entry.location)?.select(&primary);
        let Some((index, parent)) = matches.first().and_then(|p| p.split_last()) else {
            tracing::warn!(file = %entry.file, "included subtree removed, dropping file");
            continue;
        };
        let Some(parent_element) = crate::xpath::element_at_mut(&mut primary, parent) else {
            continue;
        };
        let restored = std::mem::replace(
            &mut parent_element.children[*index],
            XMLNode::Element(entry.include.clone()),
        );
        if let XMLNode::Element(subtree) = restored {
            split.insert(entry.file.clone(), subtree);
        }
    }
    Ok((primary, split))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_xml;
    use pretty_assertions::assert_eq;

    const INP: &str = r#"<fleurInput fleurInputVersion="0.34">
        <cell>
            <xi:include xmlns:xi="http://www.w3.org/2001/XInclude" href="sym.xml"/>
            <bulkLattice scale="1.0"/>
        </cell>
        <xi:include xmlns:xi="http://www.w3.org/2001/XInclude" href="relax.xml"><xi:fallback/></xi:include>
    </fleurInput>"#;

    const SYM: &str = r#"<symmetryOperations><symOp><row-1>1 0 0 0</row-1></symOp></symmetryOperations>"#;

    fn files() -> BTreeMap<String, Vec<u8>> {
        BTreeMap::from([
            ("inp.xml".to_string(), INP.as_bytes().to_vec()),
            ("sym.xml".to_string(), SYM.as_bytes().to_vec()),
        ])
    }

    #[test]
    fn includes_in_the_file_set_are_inlined() {
        let files = files();
        let mut tree = parse_file(&files, "inp.xml").unwrap();
        let map = inline_includes(&mut tree, &files).unwrap();

        assert_eq!(map.files().collect::<Vec<_>>(), vec!["sym.xml"]);
        assert_eq!(map.get("sym.xml").unwrap().location, "/fleurInput/cell/symmetryOperations");
        let hits = XPath::parse("/fleurInput/cell/symmetryOperations/symOp").unwrap().select(&tree);
        assert_eq!(hits.len(), 1);
        // relax.xml is absent: its include stays
        assert_eq!(XPath::parse("//xi:include").unwrap().select(&tree).len(), 1);
    }

    #[test]
    fn split_restores_original_documents() {
        let files = files();
        let original = parse_file(&files, "inp.xml").unwrap();
        let mut tree = original.clone();
        let map = inline_includes(&mut tree, &files).unwrap();

        let (primary, split) = split_includes(&tree, &map).unwrap();
        assert_eq!(primary, original);
        assert_eq!(split["sym.xml"], parse_xml("sym.xml", SYM.as_bytes()).unwrap());
    }

    #[test]
    fn deleted_subtree_drops_the_file() {
        let files = files();
        let mut tree = parse_file(&files, "inp.xml").unwrap();
        let map = inline_includes(&mut tree, &files).unwrap();
        let cell = tree.get_mut_child("cell").unwrap();
        cell.children.retain(|n| !matches!(n, XMLNode::Element(e) if e.name == "symmetryOperations"));

        let (_, split) = split_includes(&tree, &map).unwrap();
        assert!(split.is_empty());
    }

    #[test]
    fn malformed_included_file_is_reported() {
        let mut files = files();
        files.insert("sym.xml".to_string(), b"<symmetryOperations>".to_vec());
        let mut tree = parse_file(&files, "inp.xml").unwrap();
        assert!(matches!(
            inline_includes(&mut tree, &files),
            Err(XmlError::Malformed { file, .. }) if file == "sym.xml"
        ));
    }
}
