//! Validation gate
//!
//! Decides whether an edited tree may be persisted. Decks of a registered
//! format version are validated against their schema and the density matrix
//! side channel is checked against the LDA+U setup. Develop versions were
//! admitted explicitly at load time; for them schema validation is skipped
//! with a warning.

use crate::error::{FleurinpError, Result};
use crate::interpreter::size_mismatch;
use crate::data::NMMP_MAT;
use fleurinp_xml::{Element, Schema, ValidationDiagnostic};

/// Check an edited tree and side channel
///
/// `develop` is true when the original deck's version differs from the
/// schema version it was loaded with.
///
/// # Errors
/// [`FleurinpError::Validation`] carrying every diagnostic found
pub fn check(tree: &Element, schema: &Schema, develop: bool, nmmp: Option<&[String]>) -> Result<()> {
    let mut diagnostics = if develop {
        tracing::warn!(
            schema = schema.version(),
            "input version has no registered schema, skipping validation; unexpected errors may occur later"
        );
        Vec::new()
    } else {
        schema.validate(tree)
    };

    if let Some(lines) = nmmp {
        if let Some(message) = size_mismatch(tree, lines)? {
            diagnostics.push(ValidationDiagnostic::new(NMMP_MAT, message));
        }
    }

    if diagnostics.is_empty() {
        return Ok(());
    }
    tracing::debug!(count = diagnostics.len(), "edited input rejected");
    Err(FleurinpError::Validation {
        version: schema.version().to_string(),
        diagnostics,
    })
}
