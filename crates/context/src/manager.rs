//! The context manager: one budgeted context string per turn, and routing
//! of post-turn events into the stores.
//!
//! Every store is optional. A store that is disabled in configuration, or
//! that failed to open, is simply absent; assembly and event handling skip
//! it. Errors from a present store are logged and treated as "contributed
//! nothing", so the calling agent loop never sees a failure from here.

use std::sync::Arc;
use std::time::Duration;

use mnemos_config::{MnemosConfig, SimilarityBackendKind};
use mnemos_core::{Message, MemoryStats, RateLimiter, SessionSummary};
use mnemos_memory::{
    ArtifactOptions, ArtifactStats, ArtifactStore, BackendPreference, EntityGraph, GraphOptions, GraphStats,
    SimilarityOptions, SimilarityQuery, SimilarityStats, SimilarityStore, Summarizer, SummarizerOptions,
    SummaryStats,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compaction;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";
const SESSION_SUMMARIES_IN_CONTEXT: usize = 10;
const FALLBACK_SUMMARIES_IN_CONTEXT: usize = 5;
const ENTITIES_PER_TERM: usize = 3;
const MAX_RELEVANT_ENTITIES: usize = 10;
/// Rough number of messages one round produces.
const MESSAGES_PER_ROUND: usize = 4;

// ── Types ─────────────────────────────────────────────────────────────────

/// The stores a manager orchestrates. `None` means disabled or unavailable.
#[derive(Default)]
pub struct Stores {
    pub similarity: Option<SimilarityStore>,
    pub summarizer: Option<Summarizer>,
    pub graph: Option<EntityGraph>,
    pub artifacts: Option<ArtifactStore>,
}

/// What `on_tool_result` did with a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolResultOutcome {
    /// Similarity record id, if the result was indexed.
    pub indexed_id: Option<String>,
    pub entities_extracted: usize,
}

/// Session counters plus per-store diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ContextStats {
    pub session_id: String,
    pub tools_used: Vec<String>,
    pub rounds_since_summary: u32,
    pub totals: MemoryStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<SimilarityStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summaries: Option<SummaryStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactStats>,
}

/// Ephemeral per-session counters. Never persisted.
#[derive(Debug, Default)]
struct SessionState {
    tools_used: Vec<String>,
    rounds_since_summary: u32,
}

impl SessionState {
    fn record_tool(&mut self, tool_name: &str) {
        if !self.tools_used.iter().any(|t| t == tool_name) {
            self.tools_used.push(tool_name.to_string());
        }
    }
}

/// Orchestrates the similarity store, summarizer, entity graph, and
/// artifact store for one session.
pub struct ContextManager {
    pub(crate) config: MnemosConfig,
    pub(crate) session_id: String,
    pub(crate) stores: Stores,
    session: Mutex<SessionState>,
}

// ── Construction ──────────────────────────────────────────────────────────

impl ContextManager {
    /// Wrap already-opened stores.
    pub fn new(config: MnemosConfig, session_id: impl Into<String>, stores: Stores) -> Self {
        Self {
            config,
            session_id: session_id.into(),
            stores,
            session: Mutex::new(SessionState::default()),
        }
    }

    /// Open every enabled store described by `config`.
    ///
    /// A store that cannot open is logged and left out; the others still
    /// start. A missing `session_id` gets a fresh UUID.
    pub async fn from_config(config: MnemosConfig) -> Self {
        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !config.enable_memory {
            info!(session = %session_id, "Memory disabled");
            return Self::new(config, session_id, Stores::default());
        }

        let provider = match mnemos_providers::build_from_config(&config.provider) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!(error = %e, "Provider unavailable, similarity search and summaries disabled");
                None
            }
        };
        let limiter = || {
            Arc::new(RateLimiter::new(
                config.provider.max_requests,
                Duration::from_secs(config.provider.rate_window_secs),
            ))
        };
        let request_timeout = Duration::from_secs(config.provider.request_timeout_secs);

        let similarity = match &provider {
            Some(provider) if config.similarity.enabled => {
                let options = SimilarityOptions {
                    dir: config.similarity_dir(),
                    preference: match config.similarity.backend {
                        SimilarityBackendKind::Sqlite => BackendPreference::Native,
                        SimilarityBackendKind::Flat => BackendPreference::Flat,
                    },
                    embedding_model: config.similarity.embedding_model.clone(),
                    max_results: config.similarity.max_results,
                    threshold: config.similarity.threshold,
                    request_timeout,
                };
                match SimilarityStore::open(options, Arc::clone(provider), limiter()).await {
                    Ok(store) => Some(store),
                    Err(e) => {
                        warn!(error = %e, "Similarity store failed to open, continuing without it");
                        None
                    }
                }
            }
            _ => None,
        };

        let summarizer = match &provider {
            Some(provider) if config.summaries.enabled => {
                let options = SummarizerOptions {
                    after_rounds: config.summaries.after_rounds,
                    model: config.summaries.model.clone(),
                    max_summary_tokens: config.summaries.max_summary_tokens,
                    min_segment_tokens: config.summaries.min_segment_tokens,
                    request_timeout,
                };
                Some(Summarizer::open(
                    config.summaries_file(),
                    options,
                    Arc::clone(provider),
                    limiter(),
                ))
            }
            _ => None,
        };

        let graph = config.graph.enabled.then(|| {
            EntityGraph::open(
                config.graph_file(),
                GraphOptions {
                    max_entities: config.graph.max_entities,
                    max_relationships: config.graph.max_relationships,
                    eviction_fraction: config.graph.eviction_fraction,
                },
            )
        });

        let artifacts = if config.artifacts.enabled {
            let options = ArtifactOptions {
                max_artifact_bytes: config.max_artifact_bytes(),
                quota_bytes: (config.artifacts.max_total_artifacts_gb > 0)
                    .then(|| config.artifacts.max_total_artifacts_gb * 1024 * 1024 * 1024),
            };
            match ArtifactStore::open(config.artifacts_dir(), options) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!(error = %e, "Artifact store failed to open, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        let stores = Stores {
            similarity,
            summarizer,
            graph,
            artifacts,
        };
        info!(
            session = %session_id,
            similarity = stores.similarity.is_some(),
            summaries = stores.summarizer.is_some(),
            graph = stores.graph.is_some(),
            artifacts = stores.artifacts.is_some(),
            "Context manager ready"
        );
        Self::new(config, session_id, stores)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &MnemosConfig {
        &self.config
    }

    pub fn similarity(&self) -> Option<&SimilarityStore> {
        self.stores.similarity.as_ref()
    }

    pub fn summarizer(&self) -> Option<&Summarizer> {
        self.stores.summarizer.as_ref()
    }

    pub fn graph(&self) -> Option<&EntityGraph> {
        self.stores.graph.as_ref()
    }

    pub fn artifacts(&self) -> Option<&ArtifactStore> {
        self.stores.artifacts.as_ref()
    }
}

// ── Assembly ──────────────────────────────────────────────────────────────

impl ContextManager {
    /// Build the context to inject before a model turn.
    ///
    /// Sources are queried in fixed order (similarity, summaries, graph),
    /// each formatted within its own budget. Returns an empty string when
    /// nothing was found or memory is disabled.
    pub async fn assemble_context(&self, user_message: &str, messages: &[Message], round: u32) -> String {
        if !self.config.enable_memory {
            return String::new();
        }
        debug!(round, history = messages.len(), "Assembling memory context");

        let sections: Vec<String> = [
            self.similarity_section(user_message).await,
            self.summary_section().await,
            self.graph_section(user_message).await,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();

        if sections.is_empty() {
            return String::new();
        }

        let short_id = self.session_id.get(..8).unwrap_or(&self.session_id);
        format!(
            "## Memory Context (Session: {short_id}, Round: {round})\n\n{}",
            sections.join(SECTION_SEPARATOR)
        )
    }

    async fn similarity_section(&self, query: &str) -> String {
        let Some(store) = &self.stores.similarity else {
            return String::new();
        };
        if query.trim().is_empty() {
            return String::new();
        }

        let request = SimilarityQuery::new(query).limit(self.config.similarity.max_results);
        match store.search(&request).await {
            Ok(hits) => SimilarityStore::format_for_context(&hits, self.config.budget.similarity_tokens),
            Err(e) => {
                warn!(error = %e, "Similarity search failed, skipping source");
                String::new()
            }
        }
    }

    async fn summary_section(&self) -> String {
        let Some(summarizer) = &self.stores.summarizer else {
            return String::new();
        };

        let mut summaries = summarizer
            .get_context_summaries(Some(&self.session_id), SESSION_SUMMARIES_IN_CONTEXT)
            .await;
        if summaries.is_empty() {
            summaries = summarizer
                .get_context_summaries(None, FALLBACK_SUMMARIES_IN_CONTEXT)
                .await;
        }
        Summarizer::format_for_context(&summaries, self.config.budget.summary_tokens)
    }

    async fn graph_section(&self, query: &str) -> String {
        let Some(graph) = &self.stores.graph else {
            return String::new();
        };

        let mut names: Vec<String> = Vec::new();
        for term in query_terms(query) {
            for entity in graph.find_entities(Some(term), None, ENTITIES_PER_TERM).await {
                if !names.contains(&entity.name) {
                    names.push(entity.name);
                }
            }
            if names.len() >= MAX_RELEVANT_ENTITIES {
                break;
            }
        }
        names.truncate(MAX_RELEVANT_ENTITIES);

        let relevant = (!names.is_empty()).then_some(names.as_slice());
        graph
            .format_for_context(relevant, self.config.budget.graph_tokens)
            .await
    }
}

/// Words of `query` worth looking up as entity names.
fn query_terms(query: &str) -> impl Iterator<Item = &str> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() >= 2)
}

// ── Events ────────────────────────────────────────────────────────────────

impl ContextManager {
    /// Record a tool execution: usage always, similarity indexing above the
    /// size threshold, entity extraction when enabled.
    pub async fn on_tool_result(
        &self,
        tool_name: &str,
        tool_input: &serde_json::Value,
        result: &str,
    ) -> ToolResultOutcome {
        let mut outcome = ToolResultOutcome::default();
        if !self.config.enable_memory {
            return outcome;
        }

        self.session.lock().await.record_tool(tool_name);

        if let Some(store) = &self.stores.similarity
            && result.len() >= self.config.similarity.min_index_chars
        {
            match store
                .add_tool_result(tool_name, tool_input, result, &self.session_id)
                .await
            {
                Ok(id) => outcome.indexed_id = id,
                Err(e) => warn!(tool = tool_name, error = %e, "Failed to index tool result"),
            }
        }

        if let Some(graph) = &self.stores.graph
            && self.config.graph.auto_extract
        {
            match graph.extract_entities_from_text(result, tool_name).await {
                Ok(entities) => outcome.entities_extracted = entities.len(),
                Err(e) => warn!(tool = tool_name, error = %e, "Entity extraction failed"),
            }
        }

        debug!(
            tool = tool_name,
            indexed = outcome.indexed_id.is_some(),
            entities = outcome.entities_extracted,
            "Tool result recorded"
        );
        outcome
    }

    /// Close a round. Summarizes the trailing window when the trigger fires.
    ///
    /// Returns the new summary if one was written. On failure the round
    /// counter keeps growing and the next round retries.
    pub async fn on_round_complete(
        &self,
        messages: &[Message],
        round: u32,
        tools_used: &[String],
    ) -> Option<SessionSummary> {
        if !self.config.enable_memory {
            return None;
        }

        let tools = {
            let mut session = self.session.lock().await;
            session.rounds_since_summary += 1;
            for tool in tools_used {
                session.record_tool(tool);
            }
            session.tools_used.clone()
        };

        let summarizer = self.stores.summarizer.as_ref()?;
        if !summarizer.should_summarize(&self.session_id, round).await {
            return None;
        }

        let after_rounds = summarizer.after_rounds();
        let start_round = (round + 1).saturating_sub(after_rounds).max(1);
        let window = messages
            .len()
            .min(after_rounds as usize * MESSAGES_PER_ROUND);
        let segment = &messages[messages.len() - window..];

        match summarizer
            .summarize(segment, start_round, round, &self.session_id, &tools)
            .await
        {
            Ok(summary) => {
                self.session.lock().await.rounds_since_summary = 0;
                Some(summary)
            }
            Err(e) => {
                warn!(round, error = %e, "Summarization skipped");
                None
            }
        }
    }

    /// Index a final answer. Returns the similarity record id.
    pub async fn on_analysis_complete(&self, query: &str, result: &str, tools_used: &[String]) -> Option<String> {
        if !self.config.enable_memory {
            return None;
        }
        let store = self.stores.similarity.as_ref()?;
        match store
            .add_analysis_result(query, result, tools_used, &self.session_id)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "Failed to index analysis result");
                None
            }
        }
    }

    /// Shrink `messages` to fit `max_tokens`. Never called during assembly.
    pub async fn compact_messages(&self, messages: &[Message], max_tokens: usize) -> Vec<Message> {
        let (summaries_available, has_summary) = match &self.stores.summarizer {
            Some(summarizer) => (true, summarizer.last_summarized_round(&self.session_id).await > 0),
            None => (false, false),
        };
        compaction::compact(
            messages,
            max_tokens,
            &self.config.compaction,
            summaries_available,
            has_summary,
        )
    }
}

// ── Management ────────────────────────────────────────────────────────────

impl ContextManager {
    pub async fn stats(&self) -> ContextStats {
        let (tools_used, rounds_since_summary) = {
            let session = self.session.lock().await;
            (session.tools_used.clone(), session.rounds_since_summary)
        };

        let similarity = match &self.stores.similarity {
            Some(store) => store
                .stats()
                .await
                .inspect_err(|e| warn!(error = %e, "Similarity stats unavailable"))
                .ok(),
            None => None,
        };
        let summaries = match &self.stores.summarizer {
            Some(summarizer) => Some(summarizer.stats().await),
            None => None,
        };
        let graph = match &self.stores.graph {
            Some(graph) => Some(graph.stats().await),
            None => None,
        };
        let artifacts = match &self.stores.artifacts {
            Some(store) => Some(store.stats().await),
            None => None,
        };

        let totals = MemoryStats {
            total_entities: graph.as_ref().map_or(0, |g| g.total_entities),
            total_relationships: graph.as_ref().map_or(0, |g| g.total_relationships),
            total_artifacts: artifacts.as_ref().map_or(0, |a| a.total_artifacts),
            total_summaries: summaries.as_ref().map_or(0, |s| s.total_summaries),
            total_similarity_documents: similarity.as_ref().map_or(0, |s| s.documents),
            storage_bytes: artifacts.as_ref().map_or(0, |a| a.total_size_bytes),
            last_updated: Some(chrono::Utc::now()),
        };

        ContextStats {
            session_id: self.session_id.clone(),
            tools_used,
            rounds_since_summary,
            totals,
            similarity,
            summaries,
            graph,
            artifacts,
        }
    }

    /// Drop this session's summaries and counters. Returns what was cleared.
    pub async fn clear_session(&self) -> String {
        let mut cleared = Vec::new();

        if let Some(summarizer) = &self.stores.summarizer {
            match summarizer.clear_session(&self.session_id).await {
                Ok(removed) => cleared.push(format!("{removed} summaries")),
                Err(e) => warn!(error = %e, "Failed to clear session summaries"),
            }
        }

        *self.session.lock().await = SessionState::default();
        cleared.push("session state".to_string());

        info!(session = %self.session_id, "Session memory cleared");
        format!("Cleared: {}", cleared.join(", "))
    }

    /// Wipe the similarity store and the graph. Artifacts are left alone.
    pub async fn clear_all(&self) -> String {
        let mut cleared = Vec::new();

        if let Some(store) = &self.stores.similarity {
            match store.clear().await {
                Ok(()) => cleared.push("similarity store"),
                Err(e) => warn!(error = %e, "Failed to clear similarity store"),
            }
        }
        if let Some(graph) = &self.stores.graph {
            match graph.clear().await {
                Ok(()) => cleared.push("entity graph"),
                Err(e) => warn!(error = %e, "Failed to clear entity graph"),
            }
        }

        *self.session.lock().await = SessionState::default();
        cleared.push("session state");

        info!("All memory cleared");
        format!("Cleared: {}", cleared.join(", "))
    }
}
