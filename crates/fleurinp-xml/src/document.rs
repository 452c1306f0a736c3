//! Parsing and writing of input documents over an in-memory file set

use crate::error::XmlError;
use std::collections::BTreeMap;
use xmltree::{EmitterConfig, Element, XMLNode};

/// Read access to a named set of files
///
/// The loader only ever reads through this trait, so documents split over
/// several files are resolved without touching the filesystem.
pub trait FileSource {
    /// Bytes of the named file, if present
    fn read_file(&self, name: &str) -> Option<&[u8]>;

    /// Whether the named file is present
    fn has_file(&self, name: &str) -> bool {
        self.read_file(name).is_some()
    }
}

impl FileSource for BTreeMap<String, Vec<u8>> {
    fn read_file(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(Vec::as_slice)
    }
}

/// Parse a document and return its root element
///
/// Comments and processing instructions are dropped.
///
/// # Errors
/// [`XmlError::Malformed`] if the bytes are not well-formed XML
pub fn parse_xml(file: &str, bytes: &[u8]) -> Result<Element, XmlError> {
    let mut root = Element::parse(bytes).map_err(|e| XmlError::Malformed {
        file: file.to_string(),
        message: e.to_string(),
    })?;
    strip_non_elements(&mut root);
    Ok(root)
}

/// Read and parse a file from a file source
///
/// # Errors
/// [`XmlError::MissingFile`] or [`XmlError::Malformed`]
pub fn parse_file(files: &impl FileSource, name: &str) -> Result<Element, XmlError> {
    let bytes = files
        .read_file(name)
        .ok_or_else(|| XmlError::MissingFile(name.to_string()))?;
    parse_xml(name, bytes)
}

/// Serialize a tree with a document declaration and two-space indentation
///
/// # Errors
/// [`XmlError::Serialize`] if the emitter fails
pub fn write_xml(file: &str, root: &Element) -> Result<Vec<u8>, XmlError> {
    let config = EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ")
        .write_document_declaration(true);
    let mut out = Vec::new();
    root.write_with_config(&mut out, config)
        .map_err(|e| XmlError::Serialize {
            file: file.to_string(),
            message: e.to_string(),
        })?;
    out.push(b'\n');
    Ok(out)
}

fn strip_non_elements(element: &mut Element) {
    element.children.retain(|node| match node {
        XMLNode::Comment(_) | XMLNode::ProcessingInstruction(..) => false,
        XMLNode::Text(text) => !text.trim().is_empty(),
        _ => true,
    });
    for child in &mut element.children {
        if let XMLNode::Element(e) = child {
            strip_non_elements(e);
        }
    }
}

/// Element children of `element`, skipping text nodes
pub fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

/// Concatenated text content directly below `element`
#[must_use]
pub fn text_of(element: &Element) -> Option<String> {
    element.get_text().map(|t| t.trim().to_string())
}

/// Replace the text content of `element`, keeping its child elements
pub fn set_text(element: &mut Element, text: &str) {
    element
        .children
        .retain(|node| !matches!(node, XMLNode::Text(_) | XMLNode::CData(_)));
    element.children.insert(0, XMLNode::Text(text.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_drops_comments_and_whitespace() {
        let root = parse_xml(
            "inp.xml",
            b"<fleurInput><!-- note --><cell>\n  </cell>\n</fleurInput>",
        )
        .unwrap();
        assert_eq!(root.children.len(), 1);
        assert!(child_elements(&root).all(|e| e.children.is_empty()));
    }

    #[test]
    fn malformed_input_names_the_file() {
        let err = parse_xml("sym.xml", b"<symmetryOperations>").unwrap_err();
        assert!(matches!(err, XmlError::Malformed { file, .. } if file == "sym.xml"));
    }

    #[test]
    fn written_documents_parse_back_identically() {
        let root = parse_xml(
            "inp.xml",
            br#"<fleurInput fleurInputVersion="0.34"><cell><bzIntegration mode="hist"/></cell></fleurInput>"#,
        )
        .unwrap();
        let bytes = write_xml("inp.xml", &root).unwrap();
        assert!(bytes.starts_with(b"<?xml"));
        assert_eq!(parse_xml("inp.xml", &bytes).unwrap(), root);
    }

    #[test]
    fn set_text_keeps_child_elements() {
        let mut root = parse_xml("inp.xml", b"<a>old<b/></a>").unwrap();
        set_text(&mut root, "new");
        assert_eq!(text_of(&root).as_deref(), Some("new"));
        assert_eq!(child_elements(&root).count(), 1);
    }

    #[test]
    fn file_source_reports_missing_files() {
        let files = BTreeMap::from([("inp.xml".to_string(), b"<a/>".to_vec())]);
        assert!(files.has_file("inp.xml"));
        assert!(matches!(parse_file(&files, "kpts.xml"), Err(XmlError::MissingFile(_))));
    }
}
