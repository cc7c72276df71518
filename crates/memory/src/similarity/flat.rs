//! Brute-force similarity backend.
//!
//! Keeps every vector in memory and scores them all on each search.
//! Persisted as two files in the store directory:
//! - `vector_index.json` — model metadata plus every record
//! - `vectors.bin` — id-tagged little-endian `f32` vectors
//!
//! Metadata is written first. A crash between the two writes leaves records
//! without vectors, which are dropped on the next load; a vector is never
//! orphaned from its record.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mnemos_core::error::MemoryError;
use mnemos_core::{SimilarityHit, SimilarityRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{IndexMeta, SimilarityBackend};
use crate::persist;
use crate::vector;

const INDEX_FILE: &str = "vector_index.json";
const VECTORS_FILE: &str = "vectors.bin";

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    meta: Option<IndexMeta>,
    #[serde(default)]
    records: Vec<SimilarityRecord>,
}

#[derive(Debug, Default)]
struct FlatState {
    meta: Option<IndexMeta>,
    records: Vec<SimilarityRecord>,
    vectors: HashMap<String, Vec<f32>>,
}

/// A brute-force index persisted as flat files.
pub struct FlatIndex {
    dir: PathBuf,
    state: RwLock<FlatState>,
}

impl FlatIndex {
    /// Load the index from `dir`, creating the directory if needed.
    ///
    /// Corrupt files degrade to an empty index.
    pub fn open(dir: &Path) -> Result<Self, MemoryError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| MemoryError::Storage(format!("Cannot create {}: {e}", dir.display())))?;

        let state = Self::load(dir);
        debug!(path = %dir.display(), count = state.records.len(), "Flat similarity index loaded");

        Ok(Self {
            dir: dir.to_path_buf(),
            state: RwLock::new(state),
        })
    }

    fn load(dir: &Path) -> FlatState {
        let index: IndexFile = persist::load_json_or_default(&dir.join(INDEX_FILE), "similarity index");

        let mut vectors = match std::fs::read(dir.join(VECTORS_FILE)) {
            Ok(bytes) => decode_vectors(&bytes),
            Err(_) => HashMap::new(),
        };

        let total = index.records.len();
        let records: Vec<SimilarityRecord> = index
            .records
            .into_iter()
            .filter(|r| vectors.contains_key(&r.id))
            .collect();
        if records.len() < total {
            warn!(
                dropped = total - records.len(),
                "Dropping similarity records without stored vectors"
            );
        }
        let kept: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        vectors.retain(|id, _| kept.contains(id.as_str()));

        let meta = if records.is_empty() { None } else { index.meta };

        FlatState {
            meta,
            records,
            vectors,
        }
    }

    /// Write metadata, then vectors. Caller holds the write lock.
    fn save(&self, state: &FlatState) -> Result<(), MemoryError> {
        let index = IndexFile {
            meta: state.meta.clone(),
            records: state.records.clone(),
        };
        persist::write_json_atomic(&self.dir.join(INDEX_FILE), &index)
            .map_err(|e| MemoryError::Storage(format!("Failed to write similarity index: {e}")))?;

        let bytes = encode_vectors(&state.records, &state.vectors);
        persist::write_atomic(&self.dir.join(VECTORS_FILE), &bytes)
            .map_err(|e| MemoryError::Storage(format!("Failed to write vectors: {e}")))
    }
}

#[async_trait]
impl SimilarityBackend for FlatIndex {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn location(&self) -> &Path {
        &self.dir
    }

    async fn meta(&self) -> Result<Option<IndexMeta>, MemoryError> {
        Ok(self.state.read().await.meta.clone())
    }

    async fn insert(
        &self,
        record: &SimilarityRecord,
        embedding: &[f32],
        meta: &IndexMeta,
    ) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;

        if let Some(existing) = &state.meta
            && existing.dimension != embedding.len()
        {
            return Err(MemoryError::DimensionMismatch {
                expected: existing.dimension,
                actual: embedding.len(),
            });
        }

        if state.meta.is_none() {
            state.meta = Some(meta.clone());
        }
        state.records.push(record.clone());
        state.vectors.insert(record.id.clone(), embedding.to_vec());

        if let Err(e) = self.save(&state) {
            // Keep memory consistent with disk.
            state.records.pop();
            state.vectors.remove(&record.id);
            if state.records.is_empty() {
                state.meta = None;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        max_results: usize,
        source_filter: Option<&str>,
        min_similarity: f64,
    ) -> Result<Vec<SimilarityHit>, MemoryError> {
        let state = self.state.read().await;

        if let Some(meta) = &state.meta
            && meta.dimension != query.len()
        {
            return Err(MemoryError::DimensionMismatch {
                expected: meta.dimension,
                actual: query.len(),
            });
        }

        let candidates = state
            .records
            .iter()
            .filter_map(|r| state.vectors.get(&r.id).map(|v| (r, v.as_slice())));

        Ok(vector::rank(candidates, query, min_similarity, source_filter, max_results))
    }

    async fn recent(
        &self,
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SimilarityRecord>, MemoryError> {
        let state = self.state.read().await;
        let mut records: Vec<SimilarityRecord> = state
            .records
            .iter()
            .filter(|r| source_filter.is_none_or(|s| r.source_label == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut state = self.state.write().await;
        let Some(pos) = state.records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        state.records.remove(pos);
        state.vectors.remove(id);
        self.save(&state)?;
        Ok(true)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.state.read().await.records.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        *state = FlatState::default();
        self.save(&state)
    }
}

/// Entry layout: `u32 id_len | id bytes | u32 dim | dim × f32`, all little-endian.
fn encode_vectors(records: &[SimilarityRecord], vectors: &HashMap<String, Vec<f32>>) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        let Some(v) = vectors.get(&record.id) else {
            continue;
        };
        out.extend_from_slice(&(record.id.len() as u32).to_le_bytes());
        out.extend_from_slice(record.id.as_bytes());
        out.extend_from_slice(&(v.len() as u32).to_le_bytes());
        out.extend_from_slice(&vector::embedding_to_blob(v));
    }
    out
}

/// Decodes entries until the end of input or the first malformed entry.
fn decode_vectors(bytes: &[u8]) -> HashMap<String, Vec<f32>> {
    let mut vectors = HashMap::new();
    let mut cursor = 0usize;

    let read_u32 = |at: usize| -> Option<usize> {
        let chunk = bytes.get(at..at + 4)?;
        Some(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize)
    };

    while cursor < bytes.len() {
        let Some(id_len) = read_u32(cursor) else { break };
        let id_start = cursor + 4;
        let Some(id) = bytes
            .get(id_start..id_start + id_len)
            .and_then(|b| std::str::from_utf8(b).ok())
        else {
            break;
        };
        let Some(dim) = read_u32(id_start + id_len) else { break };
        let vec_start = id_start + id_len + 4;
        let Some(blob) = bytes.get(vec_start..vec_start + dim * 4) else {
            break;
        };
        vectors.insert(id.to_string(), vector::blob_to_embedding(blob));
        cursor = vec_start + dim * 4;
    }

    if cursor < bytes.len() {
        warn!(offset = cursor, "Truncated vector file, ignoring trailing bytes");
    }
    vectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, source: &str) -> SimilarityRecord {
        SimilarityRecord {
            id: id.into(),
            content: format!("content {id}"),
            source_label: source.into(),
            metadata: Default::default(),
            created_at: Utc::now(),
        }
    }

    fn meta(dim: usize) -> IndexMeta {
        IndexMeta {
            model: "m".into(),
            dimension: dim,
        }
    }

    #[tokio::test]
    async fn insert_search_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = FlatIndex::open(dir.path()).unwrap();
            index.insert(&record("a", "x"), &[1.0, 0.0], &meta(2)).await.unwrap();
            index.insert(&record("b", "y"), &[0.0, 1.0], &meta(2)).await.unwrap();
        }

        let index = FlatIndex::open(dir.path()).unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
        assert_eq!(index.meta().await.unwrap(), Some(meta(2)));

        let hits = index.search(&[1.0, 0.0], 5, None, 0.5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "a");
    }

    #[tokio::test]
    async fn records_without_vectors_are_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = FlatIndex::open(dir.path()).unwrap();
            index.insert(&record("a", "x"), &[1.0, 0.0], &meta(2)).await.unwrap();
        }
        // Simulate a crash after the metadata write of a second insert.
        let path = dir.path().join(INDEX_FILE);
        let mut file: IndexFile = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        file.records.push(record("b", "x"));
        std::fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let index = FlatIndex::open(dir.path()).unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        let recent = index.recent(10, None).await.unwrap();
        assert_eq!(recent[0].id, "a");
    }

    #[tokio::test]
    async fn vectors_without_records_are_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = FlatIndex::open(dir.path()).unwrap();
            index.insert(&record("a", "x"), &[1.0, 0.0], &meta(2)).await.unwrap();
            index.insert(&record("b", "x"), &[0.0, 1.0], &meta(2)).await.unwrap();
        }
        let path = dir.path().join(INDEX_FILE);
        let mut file: IndexFile = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        file.records.retain(|r| r.id == "a");
        std::fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let index = FlatIndex::open(dir.path()).unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.state.read().await.vectors.len(), 1);
        assert!(index.search(&[0.0, 1.0], 5, None, 0.5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_index_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "{{{").unwrap();
        let index = FlatIndex::open(dir.path()).unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.meta().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let index = FlatIndex::open(dir.path()).unwrap();
        index.insert(&record("a", "x"), &[1.0], &meta(1)).await.unwrap();
        index.insert(&record("b", "x"), &[1.0], &meta(1)).await.unwrap();

        assert!(index.delete("a").await.unwrap());
        assert!(!index.delete("a").await.unwrap());
        assert_eq!(index.count().await.unwrap(), 1);

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.meta().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_filters_by_source() {
        let dir = tempfile::tempdir().unwrap();
        let index = FlatIndex::open(dir.path()).unwrap();
        index.insert(&record("a", "tool_result"), &[1.0], &meta(1)).await.unwrap();
        index.insert(&record("b", "analysis"), &[1.0], &meta(1)).await.unwrap();
        let recent = index.recent(10, Some("analysis")).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "b");
    }

    #[test]
    fn truncated_vector_file_keeps_complete_entries() {
        let records = vec![record("a", "x"), record("b", "x")];
        let mut vectors = HashMap::new();
        vectors.insert("a".to_string(), vec![1.0f32, 2.0]);
        vectors.insert("b".to_string(), vec![3.0f32, 4.0]);
        let bytes = encode_vectors(&records, &vectors);
        let decoded = decode_vectors(&bytes[..bytes.len() - 3]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded["a"], vec![1.0, 2.0]);
    }
}
