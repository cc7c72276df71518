//! Error types for the mnemos domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context (store) has its own error enum; the context manager
//! collapses any of them into "this source contributed nothing".

use thiserror::Error;

/// The top-level error type for all mnemos operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Similarity store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Entity graph errors ---
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    // --- Artifact store errors ---
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    // --- Summarizer errors ---
    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Cannot index empty content")]
    EmptyContent,

    #[error("Cannot search with an empty query")]
    EmptyQuery,

    #[error("Embedding dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Entity name must not be empty")]
    EmptyName,

    #[error("Graph storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Could not serialize artifact content: {0}")]
    Serialization(String),

    #[error("Artifact too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Artifact I/O failed: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Segment too short to summarize: {tokens} tokens (minimum {minimum})")]
    TooShort { tokens: usize, minimum: usize },

    #[error("Nothing to summarize")]
    EmptySegment,

    #[error("Round {end_round} does not advance past last summarized round {last_round}")]
    StaleRound { last_round: u32, end_round: u32 },

    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("Completion timed out after {0}s")]
    Timeout(u64),

    #[error("Summary storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn artifact_size_error_names_both_sizes() {
        let err = Error::Artifact(ArtifactError::TooLarge {
            size: 2048,
            limit: 1024,
        });
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn stale_round_error_mentions_rounds() {
        let err = SummaryError::StaleRound {
            last_round: 10,
            end_round: 8,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains('8'));
    }

    #[test]
    fn memory_error_converts_to_top_level() {
        let err: Error = MemoryError::EmptyQuery.into();
        assert!(matches!(err, Error::Memory(MemoryError::EmptyQuery)));
    }
}
