//! Revision 3 source maps as bundlers consume them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while reading a source map.
#[derive(Debug, Error)]
pub enum SourceMapError {
    /// The text is not valid source map JSON.
    #[error("invalid source map: {0}")]
    Invalid(#[from] serde_json::Error),

    /// The map declares a revision other than 3.
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),
}

/// A parsed source map object.
///
/// Compilers emit maps as JSON text; bundlers expect this object form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSourceMap {
    /// Map format revision; always 3.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Name of the generated file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Prefix applied to every entry of `sources`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    /// Original source files.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Inlined original contents, parallel to `sources`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    /// Symbol names referenced by `mappings`.
    #[serde(default)]
    pub names: Vec<String>,
    /// Base64 VLQ mappings.
    #[serde(default)]
    pub mappings: String,
}

fn default_version() -> u32 {
    3
}

impl RawSourceMap {
    /// Parses source map JSON text.
    pub fn from_json(text: &str) -> Result<Self, SourceMapError> {
        let map: RawSourceMap = serde_json::from_str(text)?;
        if map.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(map.version));
        }
        Ok(map)
    }

    /// Serializes the map back to JSON text.
    pub fn to_json(&self) -> String {
        // Every field is a plain string, number or list.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Removes a trailing `//# sourceMappingURL=` comment from emitted code.
///
/// Emitters point at a sibling `.map` file; once the map travels as an object
/// the comment refers to a file that will never exist.
pub fn strip_source_mapping_url(code: &str) -> &str {
    let trimmed = code.trim_end();
    match trimmed.rfind('\n') {
        Some(idx) if trimmed[idx + 1..].starts_with("//# sourceMappingURL=") => &code[..idx],
        None if trimmed.starts_with("//# sourceMappingURL=") => "",
        _ => code,
    }
}
