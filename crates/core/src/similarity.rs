//! Similarity-store records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Metadata;

/// An indexed document. Its embedding is stored by the backend under the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRecord {
    pub id: String,
    pub content: String,
    /// Origin label, e.g. `tool_result` or `analysis`.
    pub source_label: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// A search result: a record plus its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub record: SimilarityRecord,
    pub similarity: f64,
}
