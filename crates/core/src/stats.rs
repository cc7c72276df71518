//! Aggregate memory statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document counts across every store, as reported to operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub total_artifacts: usize,
    pub total_summaries: usize,
    pub total_similarity_documents: usize,
    pub storage_bytes: u64,
    pub last_updated: Option<DateTime<Utc>>,
}
