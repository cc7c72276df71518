//! Context orchestration for mnemos.
//!
//! [`ContextManager`] sits between an agent loop and the four stores in
//! `mnemos-memory`. Before each model turn it assembles one budgeted context
//! string; after observable events it routes results into the stores.
//!
//! | Source | Budget key | Formatter |
//! |--------|-----------|-----------|
//! | Similarity search | `budget.similarity_tokens` | `SimilarityStore::format_for_context` |
//! | Session summaries | `budget.summary_tokens` | `Summarizer::format_for_context` |
//! | Entity graph | `budget.graph_tokens` | `EntityGraph::format_for_context` |

pub mod compaction;
pub mod manager;
pub mod tools;

pub use compaction::OlderHistory;
pub use manager::{ContextManager, ContextStats, Stores, ToolResultOutcome};
