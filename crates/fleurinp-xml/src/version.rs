//! Input version detection

use crate::error::XmlError;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"fleurInputVersion\s*=\s*["']([0-9]+\.[0-9]+)["']"#).expect("static pattern compiles")
});

/// Read the `fleurInputVersion` attribute from raw document bytes
///
/// Works on the bytes directly so the version is known before the document is
/// parsed against a schema.
///
/// # Errors
/// [`XmlError::VersionNotFound`] if no marker is present
pub fn extract_version(file: &str, bytes: &[u8]) -> Result<String, XmlError> {
    VERSION_PATTERN
        .captures(bytes)
        .and_then(|captures| captures.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .ok_or_else(|| XmlError::VersionNotFound(file.to_string()))
}

/// Compare two `major.minor` version strings numerically
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    fn key(v: &str) -> (u32, u32) {
        let mut parts = v.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
    }
    key(a).cmp(&key(b))
}
