//! Schema model for input documents
//!
//! A [`Schema`] describes one input format version: which elements exist (by
//! name path), which attributes they carry and of which type, which children
//! they may contain and in which order, and the type of their text content.
//!
//! Besides validation the schema answers the structural questions edits need:
//! where an attribute called `itmax` lives, and where among its siblings a
//! newly created tag belongs.

use crate::error::{SchemaError, ValidationDiagnostic};
use crate::document::child_elements;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xmltree::Element;

/// Value type of an attribute or of text content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Signed integer
    Int,
    /// Floating point number
    Float,
    /// Number or arithmetic expression (`1.0/3.0`, `2*Pi`)
    FloatExpression,
    /// `T` or `F`
    Switch,
    /// Any text
    String,
    /// Whitespace separated float expressions
    FloatVector,
}

impl ValueType {
    /// Whether `value` is a valid literal of this type
    #[must_use]
    pub fn accepts(self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::Int => value.parse::<i64>().is_ok(),
            Self::Float => value.parse::<f64>().is_ok(),
            Self::FloatExpression => is_float_expression(value),
            Self::Switch => matches!(value, "T" | "F" | "t" | "f"),
            Self::String => true,
            Self::FloatVector => {
                let mut parts = value.split_whitespace().peekable();
                parts.peek().is_some() && parts.all(is_float_expression)
            }
        }
    }
}

fn is_float_expression(value: &str) -> bool {
    if value.parse::<f64>().is_ok() {
        return true;
    }
    let mut stripped = value.to_string();
    for word in ["sqrt", "Pi", "Bohr", "Angstrom"] {
        stripped = stripped.replace(word, "1");
    }
    !stripped.trim().is_empty()
        && stripped.chars().any(|c| c.is_ascii_digit())
        && stripped
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '*' | '/' | '(' | ')' | ' '))
}

/// Declaration of one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Value type
    #[serde(rename = "type")]
    pub kind: ValueType,
    /// Whether the attribute must be present
    #[serde(default)]
    pub required: bool,
}

/// Declaration of one element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Declared attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSpec>,
    /// Allowed children in schema order; `None` leaves the content open
    #[serde(default)]
    pub children: Option<Vec<String>>,
    /// Type of the text content, if the element carries text
    #[serde(default)]
    pub text: Option<ValueType>,
}

/// Schema of one input format version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    version: String,
    root: String,
    elements: BTreeMap<String, ElementSpec>,
}

impl Schema {
    /// Decode a schema definition
    ///
    /// # Errors
    /// [`SchemaError::Yaml`] if the text does not decode,
    /// [`SchemaError::Inconsistent`] if element paths are not below the root
    pub fn from_yaml(origin: &str, text: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_yaml::from_str(text).map_err(|source| SchemaError::Yaml {
            origin: origin.to_string(),
            source,
        })?;
        let root_path = format!("/{}", schema.root);
        if !schema.elements.contains_key(&root_path) {
            return Err(SchemaError::Inconsistent {
                version: schema.version,
                message: format!("root element {root_path} is not declared"),
            });
        }
        if let Some(stray) = schema
            .elements
            .keys()
            .find(|path| *path != &root_path && !path.starts_with(&format!("{root_path}/")))
        {
            return Err(SchemaError::Inconsistent {
                version: schema.version.clone(),
                message: format!("element {stray} is outside the root element"),
            });
        }
        Ok(schema)
    }

    /// Format version described by this schema
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Name of the root element
    #[inline]
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Declaration of the element at a name path
    #[must_use]
    pub fn element(&self, path: &str) -> Option<&ElementSpec> {
        self.elements.get(path)
    }

    /// Type of an attribute on the element at `path`
    #[must_use]
    pub fn attribute_type(&self, path: &str, name: &str) -> Option<ValueType> {
        self.elements
            .get(path)
            .and_then(|e| e.attributes.get(name))
            .map(|a| a.kind)
    }

    /// Element paths declaring an attribute called `name`
    #[must_use]
    pub fn attribute_paths(&self, name: &str) -> Vec<&str> {
        self.elements
            .iter()
            .filter(|(_, spec)| spec.attributes.contains_key(name))
            .map(|(path, _)| path.as_str())
            .collect()
    }

    /// Declared element paths ending in a tag called `name`
    #[must_use]
    pub fn tag_paths(&self, name: &str) -> Vec<&str> {
        self.elements
            .keys()
            .filter(|path| path.rsplit('/').next() == Some(name))
            .map(String::as_str)
            .collect()
    }

    /// Element paths ending in `name` whose element carries text
    #[must_use]
    pub fn text_paths(&self, name: &str) -> Vec<&str> {
        self.tag_paths(name)
            .into_iter()
            .filter(|path| self.elements.get(*path).is_some_and(|e| e.text.is_some()))
            .collect()
    }

    /// Schema order of the children of the element at `path`
    #[must_use]
    pub fn child_order(&self, path: &str) -> Option<&[String]> {
        self.elements.get(path).and_then(|e| e.children.as_deref())
    }

    /// Check a tree against this schema
    ///
    /// Returns every violation found; an empty list means the tree is valid.
    /// Elements the schema does not declare are checked only for being
    /// allowed by their parent.
    #[must_use]
    pub fn validate(&self, root: &Element) -> Vec<ValidationDiagnostic> {
        let mut diagnostics = Vec::new();
        if root.name != self.root {
            diagnostics.push(ValidationDiagnostic::new(
                format!("/{}", root.name),
                format!("root element must be '{}'", self.root),
            ));
            return diagnostics;
        }
        self.validate_element(root, &format!("/{}", root.name), &mut diagnostics);
        diagnostics
    }

    fn validate_element(&self, element: &Element, path: &str, out: &mut Vec<ValidationDiagnostic>) {
        if let Some(spec) = self.elements.get(path) {
            for (name, attribute) in &spec.attributes {
                match element.attributes.get(name) {
                    Some(value) if !attribute.kind.accepts(value) => out.push(ValidationDiagnostic::new(
                        path,
                        format!("attribute '{name}' value '{value}' is not a valid {:?}", attribute.kind),
                    )),
                    None if attribute.required => out.push(ValidationDiagnostic::new(
                        path,
                        format!("missing required attribute '{name}'"),
                    )),
                    _ => {}
                }
            }
            for name in element.attributes.keys() {
                if !spec.attributes.contains_key(name) {
                    out.push(ValidationDiagnostic::new(
                        path,
                        format!("attribute '{name}' is not allowed"),
                    ));
                }
            }
            match (spec.text, crate::document::text_of(element)) {
                (Some(kind), Some(text)) if !kind.accepts(&text) => out.push(ValidationDiagnostic::new(
                    path,
                    format!("text '{text}' is not a valid {kind:?}"),
                )),
                (None, Some(text)) if !text.is_empty() => out.push(ValidationDiagnostic::new(
                    path,
                    "text content is not allowed",
                )),
                _ => {}
            }
            if let Some(allowed) = &spec.children {
                for child in child_elements(element) {
                    if !allowed.iter().any(|a| a == &child.name) {
                        out.push(ValidationDiagnostic::new(
                            path,
                            format!("unexpected child element '{}'", child.name),
                        ));
                    }
                }
            }
        }
        for child in child_elements(element) {
            self.validate_element(child, &format!("{path}/{}", child.name), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_xml;

    const SCHEMA: &str = r#"
version: "0.99"
root: fleurInput
elements:
  /fleurInput:
    attributes:
      fleurInputVersion: {type: string, required: true}
    children: [calculationSetup, atomGroups]
  /fleurInput/calculationSetup:
    children: [cutoffs, scfLoop]
  /fleurInput/calculationSetup/cutoffs:
    attributes:
      Kmax: {type: float, required: true}
    children: []
  /fleurInput/calculationSetup/scfLoop:
    attributes:
      itmax: {type: int, required: true}
      imix: {type: string}
    children: []
  /fleurInput/atomGroups/atomGroup/relPos:
    attributes:
      label: {type: string}
    text: float_vector
"#;

    fn schema() -> Schema {
        Schema::from_yaml("test", SCHEMA).unwrap()
    }

    fn check(xml: &str) -> Vec<String> {
        schema()
            .validate(&parse_xml("inp.xml", xml.as_bytes()).unwrap())
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn valid_tree_has_no_diagnostics() {
        let diagnostics = check(
            r#"<fleurInput fleurInputVersion="0.99"><calculationSetup><cutoffs Kmax="4.0"/><scfLoop itmax="9"/></calculationSetup></fleurInput>"#,
        );
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn typed_attributes_are_checked() {
        let diagnostics = check(
            r#"<fleurInput fleurInputVersion="0.99"><calculationSetup><scfLoop itmax="many"/></calculationSetup></fleurInput>"#,
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].starts_with("/fleurInput/calculationSetup/scfLoop: attribute 'itmax'"));
    }

    #[test]
    fn structure_violations_are_reported() {
        let diagnostics = check(
            r#"<fleurInput><calculationSetup><scfLoop itmax="9" foo="1"/><bogus/></calculationSetup></fleurInput>"#,
        );
        assert_eq!(diagnostics.len(), 3, "{diagnostics:?}");
        assert!(diagnostics.iter().any(|d| d.contains("missing required attribute 'fleurInputVersion'")));
        assert!(diagnostics.iter().any(|d| d.contains("'foo' is not allowed")));
        assert!(diagnostics.iter().any(|d| d.contains("unexpected child element 'bogus'")));
    }

    #[test]
    fn wrong_root_is_reported() {
        assert_eq!(check("<inputGen/>").len(), 1);
    }

    #[test]
    fn text_content_is_typed() {
        let diagnostics = check(
            r#"<fleurInput fleurInputVersion="0.99"><atomGroups><atomGroup><relPos>1.0/2.0 0 x</relPos></atomGroup></atomGroups></fleurInput>"#,
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("relPos"));
    }

    #[test]
    fn structural_queries() {
        let schema = schema();
        assert_eq!(schema.attribute_paths("itmax"), vec!["/fleurInput/calculationSetup/scfLoop"]);
        assert_eq!(schema.tag_paths("relPos"), vec!["/fleurInput/atomGroups/atomGroup/relPos"]);
        assert_eq!(schema.text_paths("scfLoop"), Vec::<&str>::new());
        assert_eq!(
            schema.child_order("/fleurInput/calculationSetup").unwrap(),
            ["cutoffs".to_string(), "scfLoop".to_string()]
        );
        assert_eq!(
            schema.attribute_type("/fleurInput/calculationSetup/scfLoop", "itmax"),
            Some(ValueType::Int)
        );
    }

    #[test]
    fn elements_outside_root_are_rejected() {
        let text = "version: '1'\nroot: a\nelements:\n  /a: {}\n  /b: {}\n";
        assert!(matches!(
            Schema::from_yaml("bad", text),
            Err(SchemaError::Inconsistent { .. })
        ));
    }

    #[test]
    fn float_expressions() {
        assert!(ValueType::FloatExpression.accepts("1.0/3.0"));
        assert!(ValueType::FloatExpression.accepts("2*Pi"));
        assert!(!ValueType::FloatExpression.accepts("abc"));
        assert!(ValueType::FloatVector.accepts(".0 1.000/2.000 -0.25"));
        assert!(!ValueType::FloatVector.accepts(""));
    }
}
