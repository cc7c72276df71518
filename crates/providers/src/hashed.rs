//! Deterministic offline embedder.
//!
//! Hashes each lowercase word with SHA-256 into a signed bucket of a fixed
//! size vector, then L2-normalizes. Texts sharing vocabulary land close
//! together, identical texts always produce identical vectors, and no
//! network access is needed. Completions are not supported.

use async_trait::async_trait;
use mnemos_core::error::ProviderError;
use mnemos_core::provider::{EmbeddingRequest, EmbeddingResponse};
use sha2::{Digest, Sha256};

pub struct HashedEmbedder {
    dims: usize,
}

impl HashedEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    /// Embed one text.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        let mut words = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .peekable();

        if words.peek().is_none() {
            self.accumulate(&mut v, &lowered);
        } else {
            for word in words {
                self.accumulate(&mut v, word);
            }
        }

        l2_normalize(&mut v);
        v
    }

    fn accumulate(&self, v: &mut [f32], token: &str) {
        let hash = Sha256::digest(token.as_bytes());
        let bucket = u64::from_le_bytes([
            hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
        ]) as usize
            % self.dims;
        let sign = if hash[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign;
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[async_trait]
impl mnemos_core::Provider for HashedEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|t| self.embed_text(t)).collect(),
            model: request.model,
            usage: None,
        })
    }
}
