//! Persistent stores for mnemos.
//!
//! Four independent stores, each the sole writer of its own files under the
//! memory directory:
//! - [`SimilarityStore`] — embedded past results searched by cosine similarity
//! - [`EntityGraph`] — typed entities and relationships with regex extraction
//! - [`ArtifactStore`] — content-addressed intermediate results
//! - [`Summarizer`] — compressed summaries of conversation segments

pub mod artifacts;
pub mod graph;
pub(crate) mod persist;
pub mod similarity;
pub mod summarizer;
pub mod vector;

pub use artifacts::{
    ArtifactContent, ArtifactData, ArtifactFilter, ArtifactOptions, ArtifactStats, ArtifactStore, Exportable,
    NewArtifact, human_size,
};
pub use graph::{Direction, EntityGraph, GraphOptions, GraphStats, Neighbors, NewRelationship};
pub use similarity::{
    BackendPreference, FlatIndex, SimilarityBackend, SimilarityOptions, SimilarityQuery, SimilarityStats,
    SimilarityStore,
};
pub use summarizer::{Summarizer, SummarizerOptions, SummaryStats};
pub use vector::cosine_similarity;

#[cfg(feature = "sqlite")]
pub use similarity::SqliteIndex;
