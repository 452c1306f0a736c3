//! Structured view of an input document
//!
//! The parsed dict is a JSON value mirroring the tree: attributes become typed
//! scalars, repeated tags become arrays, text-only tags become plain values and
//! tags with both text and attributes store the text under `"value"`.

use crate::document::{child_elements, text_of};
use serde_json::{Map, Number, Value};
use xmltree::Element;

/// Build the parsed dict of a document
///
/// The root element's attributes and children form the top level, so
/// `itmax` is found at `["calculationSetup"]["scfLoop"]["itmax"]`.
#[must_use]
pub fn parsed_dict(root: &Element) -> Value {
    match element_value(root) {
        Value::Object(map) => Value::Object(map),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Value::Object(map)
        }
    }
}

/// Convert a raw attribute or text value to a typed JSON scalar
#[must_use]
pub fn typed_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    if let Some(float) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(float);
    }
    match raw {
        "T" | "t" => Value::Bool(true),
        "F" | "f" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn element_value(element: &Element) -> Value {
    let text = text_of(element).filter(|t| !t.is_empty());
    let has_children = child_elements(element).next().is_some();
    if element.attributes.is_empty() && !has_children {
        return text.map_or_else(|| Value::Object(Map::new()), |t| typed_value(&t));
    }

    let mut map = Map::new();
    for (name, value) in &element.attributes {
        map.insert(name.clone(), typed_value(value));
    }
    if let Some(text) = text {
        map.insert("value".to_string(), typed_value(&text));
    }
    let mut counts = std::collections::BTreeMap::<&str, usize>::new();
    for child in child_elements(element) {
        *counts.entry(child.name.as_str()).or_default() += 1;
    }
    for child in child_elements(element) {
        let value = element_value(child);
        if counts[child.name.as_str()] > 1 {
            let slot = map
                .entry(child.name.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = slot {
                items.push(value);
            }
        } else {
            map.insert(child.name.clone(), value);
        }
    }
    Value::Object(map)
}
