//! # mnemos Core
//!
//! Domain types, traits, and error definitions for the mnemos memory layer.
//! This crate has **no storage or network dependencies**: it defines the
//! records every store persists and the traits the external services
//! (text completion, text embedding) are consumed through.
//!
//! ## Layout
//!
//! - [`entity`], [`artifact`], [`summary`], [`similarity`]: persisted records
//! - [`message`]: the conversation model the context manager reads
//! - [`provider`]: the completion/embedding seam
//! - [`token`]: the budget estimator shared by every formatter
//! - [`rate_limit`]: per-component limiter for external calls

pub mod artifact;
pub mod entity;
pub mod error;
pub mod message;
pub mod provider;
pub mod rate_limit;
pub mod similarity;
pub mod stats;
pub mod summary;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use artifact::{Artifact, ArtifactType};
pub use entity::{Entity, EntityType, Relationship, RelationshipType};
pub use error::{ArtifactError, Error, GraphError, MemoryError, ProviderError, Result, SummaryError};
pub use message::{Message, Role, ToolCall};
pub use provider::{CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse, Provider};
pub use rate_limit::RateLimiter;
pub use similarity::{SimilarityHit, SimilarityRecord};
pub use stats::MemoryStats;
pub use summary::SessionSummary;
pub use token::{BudgetWriter, estimate_tokens, truncate_to_tokens};

/// Free-form metadata map attached to records.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
