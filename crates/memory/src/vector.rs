//! Vector similarity utilities.
//!
//! Pure-Rust exact cosine scoring shared by both similarity backends.

use mnemos_core::{SimilarityHit, SimilarityRecord};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    dot / denom
}

/// Score every candidate against `query` and return the ranked survivors.
///
/// Order of operations: score, sort descending, drop below `min_similarity`,
/// apply `source_filter`, truncate to `limit`.
pub fn rank<'a, I>(
    candidates: I,
    query: &[f32],
    min_similarity: f64,
    source_filter: Option<&str>,
    limit: usize,
) -> Vec<SimilarityHit>
where
    I: IntoIterator<Item = (&'a SimilarityRecord, &'a [f32])>,
{
    let mut scored: Vec<(f64, &SimilarityRecord)> = candidates
        .into_iter()
        .map(|(record, embedding)| (cosine_similarity(embedding, query), record))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .filter(|(sim, _)| *sim >= min_similarity)
        .filter(|(_, record)| source_filter.is_none_or(|s| record.source_label == s))
        .take(limit)
        .map(|(similarity, record)| SimilarityHit {
            record: record.clone(),
            similarity,
        })
        .collect()
}

/// Serialize an embedding vector to little-endian bytes.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_blob`]. Trailing partial floats are ignored.
pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
