//! Type-aware serialization of artifact content.
//!
//! Each content kind has exactly one canonical byte encoding. That encoding is
//! what gets size-checked, written, and later read back.

use std::fmt;

use mnemos_core::error::ArtifactError;
use serde::Serialize;

/// Objects that know how to export themselves (figures, custom tables, ...).
pub trait Exportable: Send + Sync {
    /// The object's natural byte encoding.
    fn export(&self) -> Result<Vec<u8>, String>;

    /// Short label used in error messages.
    fn kind(&self) -> &str {
        "object"
    }
}

/// Content handed to [`ArtifactStore::save`](super::ArtifactStore::save).
pub enum ArtifactContent {
    /// UTF-8 text, stored as-is.
    Text(String),
    /// Raw bytes, stored as-is.
    Bytes(Vec<u8>),
    /// Structured records, stored as pretty-printed JSON.
    Json(serde_json::Value),
    /// Rows under a header line, stored as CSV.
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Anything else that can export itself.
    Object(Box<dyn Exportable>),
}

impl ArtifactContent {
    /// Capture any serializable value as JSON content.
    pub fn json_of<T: Serialize>(value: &T) -> Result<Self, ArtifactError> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| ArtifactError::Serialization(e.to_string()))
    }

    /// The canonical encoding of this content.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        match self {
            Self::Text(text) => Ok(text.as_bytes().to_vec()),
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Json(value) => {
                serde_json::to_vec_pretty(value).map_err(|e| ArtifactError::Serialization(e.to_string()))
            }
            Self::Table { headers, rows } => Ok(to_csv(headers, rows).into_bytes()),
            Self::Object(object) => object
                .export()
                .map_err(|e| ArtifactError::Serialization(format!("{} export failed: {e}", object.kind()))),
        }
    }
}

impl fmt::Debug for ArtifactContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(t) => f.debug_tuple("Text").field(&t.len()).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Json(_) => f.write_str("Json(..)"),
            Self::Table { headers, rows } => f
                .debug_struct("Table")
                .field("columns", &headers.len())
                .field("rows", &rows.len())
                .finish(),
            Self::Object(o) => f.debug_tuple("Object").field(&o.kind()).finish(),
        }
    }
}

impl From<String> for ArtifactContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ArtifactContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for ArtifactContent {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<serde_json::Value> for ArtifactContent {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

/// Content as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactData {
    Text(String),
    Bytes(Vec<u8>),
}

impl ArtifactData {
    /// Text if the bytes are valid UTF-8, raw bytes otherwise.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Bytes(e.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(t) => t.as_bytes(),
            Self::Bytes(b) => b,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Bytes(_) => None,
        }
    }
}

fn to_csv(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for record in std::iter::once(headers).chain(rows.iter().map(Vec::as_slice)) {
        let line: Vec<String> = record.iter().map(|field| csv_field(field)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
