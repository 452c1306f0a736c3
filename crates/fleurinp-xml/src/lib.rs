//! Versioned FLEUR input documents
//!
//! Everything needed to turn the files of an input deck into one editable
//! tree and back:
//!
//! - [`extract_version`]: fast `fleurInputVersion` scan on raw bytes
//! - [`parse_xml`] / [`write_xml`]: well-formedness parse and deterministic output
//! - [`inline_includes`] / [`split_includes`]: `xi:include` expansion over a
//!   [`FileSource`] and its inverse
//! - [`XPath`]: the path subset used to address elements
//! - [`Schema`] / [`SchemaRegistry`]: per-version structure, validation and
//!   name resolution
//! - [`parsed_dict`]: typed JSON view of a tree
//!
//! # Example
//!
//! ```rust,ignore
//! use fleurinp_xml::{parse_xml, BuiltinSchemas, SchemaRegistry, XPath};
//!
//! let tree = parse_xml("inp.xml", bytes)?;
//! let schema = BuiltinSchemas::new()?.load("0.34").unwrap();
//! assert!(schema.validate(&tree).is_empty());
//! let species = XPath::parse("/fleurInput/atomSpecies/species")?.select(&tree);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod dict;
mod document;
mod error;
mod include;
mod registry;
mod schema;
mod version;
pub mod xpath;

pub use dict::{parsed_dict, typed_value};
pub use document::{child_elements, parse_file, parse_xml, set_text, text_of, write_xml, FileSource};
pub use error::{SchemaError, ValidationDiagnostic, XmlError};
pub use include::{inline_includes, split_includes, IncludeMap, IncludedFile, XINCLUDE_NAMESPACE};
pub use registry::{resolve_schema, BuiltinSchemas, ResolvedSchema, SchemaRegistry};
pub use schema::{AttributeSpec, ElementSpec, Schema, ValueType};
pub use version::{compare_versions, extract_version};
pub use xpath::{quote_literal, NodePath, XPath};

/// Re-export of the tree types edits operate on
pub use xmltree::{Element, XMLNode};
