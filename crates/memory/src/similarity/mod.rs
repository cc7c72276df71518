//! Similarity store: embeds text, persists vectors, returns nearest neighbors.
//!
//! Two interchangeable backends sit behind [`SimilarityBackend`]:
//! - [`SqliteIndex`] — persistent SQLite collection with exact cosine scan
//! - [`FlatIndex`] — brute-force in-memory index persisted as flat files
//!
//! [`SimilarityStore::open`] tries the preferred backend first and falls back
//! to the flat index on any initialization error. Callers never see which
//! one is active except through [`SimilarityStore::stats`].

pub mod flat;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mnemos_core::error::MemoryError;
use mnemos_core::provider::EmbeddingRequest;
use mnemos_core::token::{estimate_tokens, truncate_chars, truncate_to_tokens};
use mnemos_core::{BudgetWriter, Metadata, Provider, RateLimiter, SimilarityHit, SimilarityRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use flat::FlatIndex;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIndex;

/// Source label for indexed tool results.
pub const SOURCE_TOOL_RESULT: &str = "tool_result";
/// Source label for indexed final answers.
pub const SOURCE_ANALYSIS: &str = "analysis";

const MIN_TOOL_RESULT_CHARS: usize = 50;
const MAX_TOOL_RESULT_CHARS: usize = 10_000;
const MAX_ANALYSIS_CHARS: usize = 15_000;
const MAX_TOOL_INPUT_META_CHARS: usize = 1_000;
const MAX_QUERY_META_CHARS: usize = 500;

/// Below this many remaining tokens an overflowing hit is dropped, not truncated.
const MIN_TRUNCATED_HIT_TOKENS: usize = 200;

/// The embedding model and vector size a store was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub model: String,
    pub dimension: usize,
}

/// One backend's storage contract. Each implementation serializes its own writes.
#[async_trait]
pub trait SimilarityBackend: Send + Sync {
    /// Short identifier, e.g. `"sqlite"` or `"flat"`.
    fn name(&self) -> &'static str;

    /// Where the backend keeps its files.
    fn location(&self) -> &Path;

    /// Model and dimension of the stored vectors, if any have been written.
    async fn meta(&self) -> Result<Option<IndexMeta>, MemoryError>;

    /// Persist one record with its embedding.
    ///
    /// Fails with [`MemoryError::DimensionMismatch`] if the store already
    /// holds vectors of a different size.
    async fn insert(
        &self,
        record: &SimilarityRecord,
        embedding: &[f32],
        meta: &IndexMeta,
    ) -> Result<(), MemoryError>;

    /// Rank stored vectors against `query`.
    async fn search(
        &self,
        query: &[f32],
        max_results: usize,
        source_filter: Option<&str>,
        min_similarity: f64,
    ) -> Result<Vec<SimilarityHit>, MemoryError>;

    /// Newest records first.
    async fn recent(
        &self,
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SimilarityRecord>, MemoryError>;

    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    async fn count(&self) -> Result<usize, MemoryError>;

    /// Remove every record, vector, and the stored model metadata.
    async fn clear(&self) -> Result<(), MemoryError>;
}

/// Which backend to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    /// SQLite, falling back to flat files
    Native,
    /// Flat files only
    Flat,
}

/// Settings for [`SimilarityStore::open`].
#[derive(Debug, Clone)]
pub struct SimilarityOptions {
    pub dir: PathBuf,
    pub preference: BackendPreference,
    pub embedding_model: String,
    pub max_results: usize,
    /// Default `min_similarity` for searches
    pub threshold: f64,
    /// Timeout for each embedding call
    pub request_timeout: Duration,
}

/// A search request. Unset fields fall back to the store's defaults.
#[derive(Debug, Clone, Default)]
pub struct SimilarityQuery {
    pub text: String,
    pub max_results: Option<usize>,
    pub source_filter: Option<String>,
    pub min_similarity: Option<f64>,
}

impl SimilarityQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn limit(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source_filter = Some(source.into());
        self
    }

    pub fn min_similarity(mut self, min: f64) -> Self {
        self.min_similarity = Some(min);
        self
    }
}

/// Diagnostics for operators.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityStats {
    pub backend: &'static str,
    pub documents: usize,
    pub embedding_model: String,
    pub dimension: Option<usize>,
    pub location: PathBuf,
    pub threshold: f64,
}

/// The similarity store facade.
pub struct SimilarityStore {
    backend: Box<dyn SimilarityBackend>,
    embedder: Arc<dyn Provider>,
    limiter: Arc<RateLimiter>,
    options: SimilarityOptions,
    /// Vector size produced by the embedder since this store was opened; 0 until known.
    session_dimension: AtomicUsize,
}

impl SimilarityStore {
    /// Open the preferred backend, or fall back to the flat index.
    ///
    /// If the persisted vectors were produced by a different embedding
    /// model, the store is cleared: vectors of different models are never
    /// compared.
    pub async fn open(
        options: SimilarityOptions,
        embedder: Arc<dyn Provider>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, MemoryError> {
        let backend: Box<dyn SimilarityBackend> = match options.preference {
            BackendPreference::Native => match open_native(&options.dir).await {
                Ok(backend) => backend,
                Err(e) => {
                    warn!(error = %e, "Native similarity backend unavailable, using flat index");
                    Box::new(FlatIndex::open(&options.dir)?)
                }
            },
            BackendPreference::Flat => Box::new(FlatIndex::open(&options.dir)?),
        };

        Self::with_backend(backend, options, embedder, limiter).await
    }

    /// Wrap an already-constructed backend.
    pub async fn with_backend(
        backend: Box<dyn SimilarityBackend>,
        options: SimilarityOptions,
        embedder: Arc<dyn Provider>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, MemoryError> {
        if let Some(meta) = backend.meta().await?
            && meta.model != options.embedding_model
        {
            warn!(
                stored = %meta.model,
                configured = %options.embedding_model,
                "Embedding model changed, clearing similarity store"
            );
            backend.clear().await?;
        }

        info!(
            backend = backend.name(),
            location = %backend.location().display(),
            "Similarity store ready"
        );

        Ok(Self {
            backend,
            embedder,
            limiter,
            options,
            session_dimension: AtomicUsize::new(0),
        })
    }

    /// Which backend is active.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Embed and index `content`. Returns the new record id.
    pub async fn add(
        &self,
        content: &str,
        source_label: &str,
        metadata: Metadata,
    ) -> Result<String, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::EmptyContent);
        }

        let embedding = self.embed(content).await?;

        let mut metadata = metadata;
        metadata.insert("token_estimate".into(), estimate_tokens(content).into());

        let record = SimilarityRecord {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            source_label: source_label.to_string(),
            metadata,
            created_at: Utc::now(),
        };

        let meta = IndexMeta {
            model: self.options.embedding_model.clone(),
            dimension: embedding.len(),
        };
        self.backend.insert(&record, &embedding, &meta).await?;

        debug!(id = %record.id, source = source_label, "Indexed document");
        Ok(record.id)
    }

    /// Nearest neighbors of `query.text`, most similar first.
    pub async fn search(&self, query: &SimilarityQuery) -> Result<Vec<SimilarityHit>, MemoryError> {
        if query.text.trim().is_empty() {
            return Err(MemoryError::EmptyQuery);
        }

        if self.backend.count().await? == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embed(&query.text).await?;
        if self.backend.count().await? == 0 {
            return Ok(Vec::new());
        }
        self.backend
            .search(
                &embedding,
                query.max_results.unwrap_or(self.options.max_results),
                query.source_filter.as_deref(),
                query.min_similarity.unwrap_or(self.options.threshold),
            )
            .await
    }

    /// Index a tool execution result.
    ///
    /// Results under 50 characters are skipped (`Ok(None)`); long results are
    /// truncated before embedding.
    pub async fn add_tool_result(
        &self,
        tool_name: &str,
        tool_input: &serde_json::Value,
        result: &str,
        session_id: &str,
    ) -> Result<Option<String>, MemoryError> {
        if result.len() < MIN_TOOL_RESULT_CHARS {
            debug!(tool = tool_name, "Result too short to index");
            return Ok(None);
        }

        let result = cap_with_marker(result, MAX_TOOL_RESULT_CHARS);
        let input_json = tool_input.to_string();
        let content = format!("Tool: {tool_name}\nInput: {input_json}\nResult:\n{result}");

        let mut metadata = Metadata::new();
        metadata.insert("tool_name".into(), tool_name.into());
        metadata.insert(
            "tool_input".into(),
            truncate_chars(&input_json, MAX_TOOL_INPUT_META_CHARS).into(),
        );
        metadata.insert("session_id".into(), session_id.into());

        self.add(&content, SOURCE_TOOL_RESULT, metadata).await.map(Some)
    }

    /// Index a completed analysis (query plus final answer).
    pub async fn add_analysis_result(
        &self,
        query: &str,
        result: &str,
        tools_used: &[String],
        session_id: &str,
    ) -> Result<String, MemoryError> {
        let result = cap_with_marker(result, MAX_ANALYSIS_CHARS);
        let mut content = format!("Query: {query}\n\nAnswer:\n{result}");
        if !tools_used.is_empty() {
            content = format!("Tools used: {}\n{content}", tools_used.join(", "));
        }

        let mut metadata = Metadata::new();
        metadata.insert("query".into(), truncate_chars(query, MAX_QUERY_META_CHARS).into());
        metadata.insert("tools_used".into(), tools_used.to_vec().into());
        metadata.insert("session_id".into(), session_id.into());

        self.add(&content, SOURCE_ANALYSIS, metadata).await
    }

    /// Newest records first.
    pub async fn recent(
        &self,
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SimilarityRecord>, MemoryError> {
        self.backend.recent(limit, source_filter).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        self.backend.delete(id).await
    }

    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.backend.count().await
    }

    pub async fn clear(&self) -> Result<(), MemoryError> {
        self.backend.clear().await?;
        info!(backend = self.backend.name(), "Similarity store cleared");
        Ok(())
    }

    pub async fn stats(&self) -> Result<SimilarityStats, MemoryError> {
        Ok(SimilarityStats {
            backend: self.backend.name(),
            documents: self.backend.count().await?,
            embedding_model: self.options.embedding_model.clone(),
            dimension: self.backend.meta().await?.map(|m| m.dimension),
            location: self.backend.location().to_path_buf(),
            threshold: self.options.threshold,
        })
    }

    /// Render hits under `## Relevant Past Analyses` within `max_tokens`.
    ///
    /// The first hit that does not fit is truncated to the remaining budget
    /// if more than 200 tokens remain, otherwise dropped. Nothing follows it.
    pub fn format_for_context(hits: &[SimilarityHit], max_tokens: usize) -> String {
        let Some(mut out) = BudgetWriter::new("## Relevant Past Analyses\n", max_tokens) else {
            return String::new();
        };

        for (i, hit) in hits.iter().enumerate() {
            let heading = format!("### Memory {} (similarity: {:.2})", i + 1, hit.similarity);
            let block = format!("{heading}\n{}\n", hit.record.content);
            if out.push(&block) {
                continue;
            }

            let remaining = out.remaining_tokens();
            if remaining > MIN_TRUNCATED_HIT_TOKENS {
                let content_budget = remaining - estimate_tokens(&heading) - 1;
                let truncated = truncate_to_tokens(&hit.record.content, content_budget);
                out.push(&format!("{heading}\n{truncated}\n"));
            }
            break;
        }

        out.finish()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let request = EmbeddingRequest {
            model: self.options.embedding_model.clone(),
            inputs: vec![text.to_string()],
        };

        // The limiter wait counts against the request timeout.
        let call = async {
            self.limiter.acquire().await;
            self.embedder.embed(request).await
        };
        let response = match tokio::time::timeout(self.options.request_timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(MemoryError::EmbeddingFailed(e.to_string())),
            Err(_) => {
                warn!(
                    timeout_secs = self.options.request_timeout.as_secs(),
                    "Embedding request timed out"
                );
                return Err(MemoryError::EmbeddingFailed(format!(
                    "timed out after {}s",
                    self.options.request_timeout.as_secs()
                )));
            }
        };

        let embedding = match response.embeddings.into_iter().next() {
            Some(v) if !v.is_empty() => v,
            _ => return Err(MemoryError::EmbeddingFailed("provider returned no vector".into())),
        };
        self.reconcile_dimension(embedding.len()).await?;
        Ok(embedding)
    }

    /// Clear vectors persisted by a differently sized embedder.
    ///
    /// Only the first embedding of this store instance can trigger a reset.
    /// Later size changes come from an inconsistent provider and surface as
    /// [`MemoryError::DimensionMismatch`] on insert.
    async fn reconcile_dimension(&self, dimension: usize) -> Result<(), MemoryError> {
        if self
            .session_dimension
            .compare_exchange(0, dimension, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        if let Some(meta) = self.backend.meta().await?
            && meta.dimension != dimension
        {
            warn!(
                model = %meta.model,
                stored = meta.dimension,
                current = dimension,
                "Embedding dimension changed, clearing similarity store"
            );
            self.backend.clear().await?;
        }
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
async fn open_native(dir: &Path) -> Result<Box<dyn SimilarityBackend>, MemoryError> {
    Ok(Box::new(SqliteIndex::open(dir).await?))
}

#[cfg(not(feature = "sqlite"))]
async fn open_native(_dir: &Path) -> Result<Box<dyn SimilarityBackend>, MemoryError> {
    Err(MemoryError::Storage("built without the `sqlite` feature".into()))
}

fn cap_with_marker(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    format!("{}\n... (truncated)", truncate_chars(text, max_chars))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mnemos_core::ProviderError;
    use mnemos_core::provider::EmbeddingResponse;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Embeds by exact-match lookup; unknown texts map to a fixed vector.
    pub(crate) struct TableEmbedder {
        table: Mutex<HashMap<String, Vec<f32>>>,
        fallback: Vec<f32>,
        pub(crate) fail: std::sync::atomic::AtomicBool,
    }

    impl TableEmbedder {
        pub(crate) fn new(fallback: Vec<f32>) -> Self {
            Self {
                table: Mutex::new(HashMap::new()),
                fallback,
                fail: std::sync::atomic::AtomicBool::new(false),
            }
        }

        pub(crate) fn set(&self, text: &str, v: Vec<f32>) {
            self.table.lock().unwrap().insert(text.to_string(), v);
        }
    }

    #[async_trait]
    impl Provider for TableEmbedder {
        fn name(&self) -> &str {
            "table"
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ProviderError::Network("connection refused".into()));
            }
            let table = self.table.lock().unwrap();
            Ok(EmbeddingResponse {
                embeddings: request
                    .inputs
                    .iter()
                    .map(|t| table.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
                    .collect(),
                model: request.model,
                usage: None,
            })
        }
    }

    pub(crate) fn options(dir: &Path, preference: BackendPreference) -> SimilarityOptions {
        SimilarityOptions {
            dir: dir.to_path_buf(),
            preference,
            embedding_model: "test-model".into(),
            max_results: 5,
            threshold: 0.7,
            request_timeout: Duration::from_secs(5),
        }
    }

    async fn flat_store(dir: &Path, embedder: Arc<TableEmbedder>) -> SimilarityStore {
        SimilarityStore::open(
            options(dir, BackendPreference::Flat),
            embedder,
            Arc::new(RateLimiter::unlimited()),
        )
        .await
        .unwrap()
    }

    fn hit(content: &str, similarity: f64) -> SimilarityHit {
        SimilarityHit {
            record: SimilarityRecord {
                id: "x".into(),
                content: content.into(),
                source_label: SOURCE_TOOL_RESULT.into(),
                metadata: Metadata::new(),
                created_at: Utc::now(),
            },
            similarity,
        }
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0]))).await;
        let err = store.add("   ", "x", Metadata::new()).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmptyContent));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0]))).await;
        let err = store.search(&SimilarityQuery::new("")).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmptyQuery));
    }

    #[tokio::test]
    async fn empty_store_search_succeeds_even_if_embedder_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(TableEmbedder::new(vec![1.0, 0.0]));
        embedder.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let store = flat_store(dir.path(), embedder).await;
        let hits = store.search(&SimilarityQuery::new("anything")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn threshold_excludes_distant_documents() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(TableEmbedder::new(vec![0.0, 0.0, 1.0]));
        embedder.set("doc a", vec![1.0, 0.0, 0.0]);
        embedder.set("doc b", vec![0.95, 0.05, 0.0]);
        embedder.set("doc c", vec![0.0, 1.0, 0.0]);
        embedder.set("query", vec![1.0, 0.01, 0.0]);
        let store = flat_store(dir.path(), embedder).await;

        for doc in ["doc a", "doc b", "doc c"] {
            store.add(doc, SOURCE_TOOL_RESULT, Metadata::new()).await.unwrap();
        }

        let hits = store
            .search(&SimilarityQuery::new("query").min_similarity(0.9))
            .await
            .unwrap();
        let contents: Vec<_> = hits.iter().map(|h| h.record.content.as_str()).collect();
        assert_eq!(contents, vec!["doc a", "doc b"]);
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn embedding_failure_mutates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(TableEmbedder::new(vec![1.0, 0.0]));
        let store = flat_store(dir.path(), embedder.clone()).await;
        embedder.fail.store(true, std::sync::atomic::Ordering::SeqCst);

        let err = store.add("some content", "x", Metadata::new()).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingFailed(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(TableEmbedder::new(vec![1.0, 0.0]));
        embedder.set("wide", vec![1.0, 0.0, 0.0]);
        let store = flat_store(dir.path(), embedder).await;

        store.add("narrow", "x", Metadata::new()).await.unwrap();
        let err = store.add("wide", "x", Metadata::new()).await.unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch { expected: 2, actual: 3 }
        ));
    }

    #[tokio::test]
    async fn model_change_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(TableEmbedder::new(vec![1.0, 0.0]));
        {
            let store = flat_store(dir.path(), embedder.clone()).await;
            store.add("keep me?", "x", Metadata::new()).await.unwrap();
        }

        let mut opts = options(dir.path(), BackendPreference::Flat);
        opts.embedding_model = "other-model".into();
        let store = SimilarityStore::open(opts, embedder, Arc::new(RateLimiter::unlimited()))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dimension_change_under_same_model_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0]))).await;
            store.add("old vector", "x", Metadata::new()).await.unwrap();
        }

        let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0, 0.0]))).await;
        let hits = store.search(&SimilarityQuery::new("old vector")).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);

        store.add("new vector", "x", Metadata::new()).await.unwrap();
        let hits = store.search(&SimilarityQuery::new("new vector")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.stats().await.unwrap().dimension, Some(3));
    }

    #[tokio::test]
    async fn dimension_change_is_detected_on_add() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0]))).await;
            store.add("old vector", "x", Metadata::new()).await.unwrap();
        }

        let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0, 0.0]))).await;
        store.add("new vector", "x", Metadata::new()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.recent(5, None).await.unwrap()[0].content, "new vector");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_wait_is_bounded_by_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), BackendPreference::Flat);
        opts.request_timeout = Duration::from_secs(1);
        let store = SimilarityStore::open(
            opts,
            Arc::new(TableEmbedder::new(vec![1.0, 0.0])),
            Arc::new(RateLimiter::new(1, Duration::from_secs(3600))),
        )
        .await
        .unwrap();
        store.add("first document", "x", Metadata::new()).await.unwrap();

        let start = tokio::time::Instant::now();
        let err = store.search(&SimilarityQuery::new("first")).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingFailed(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn tool_result_indexing_rules() {
        let dir = tempfile::tempdir().unwrap();
        let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0]))).await;
        let input = serde_json::json!({"gene": "TP53"});

        let skipped = store.add_tool_result("blast", &input, "short", "s1").await.unwrap();
        assert!(skipped.is_none());

        let long = "A".repeat(12_000);
        let id = store.add_tool_result("blast", &input, &long, "s1").await.unwrap();
        assert!(id.is_some());

        let recent = store.recent(10, Some(SOURCE_TOOL_RESULT)).await.unwrap();
        assert_eq!(recent.len(), 1);
        let record = &recent[0];
        assert!(record.content.starts_with("Tool: blast\nInput: {\"gene\":\"TP53\"}\nResult:\n"));
        assert!(record.content.ends_with("... (truncated)"));
        assert_eq!(record.metadata["tool_name"], "blast");
        assert_eq!(record.metadata["session_id"], "s1");
    }

    #[tokio::test]
    async fn analysis_result_lists_tools_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0]))).await;
        store
            .add_analysis_result("What does TP53 do?", "It suppresses tumors.", &["ncbi".into()], "s1")
            .await
            .unwrap();
        let recent = store.recent(1, Some(SOURCE_ANALYSIS)).await.unwrap();
        assert!(recent[0].content.starts_with("Tools used: ncbi\nQuery: What does TP53 do?"));
    }

    #[tokio::test]
    async fn stats_report_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = flat_store(dir.path(), Arc::new(TableEmbedder::new(vec![1.0, 0.0]))).await;
        store.add("hello world", "x", Metadata::new()).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.backend, "flat");
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.dimension, Some(2));
    }

    #[test]
    fn format_empty_hits_is_empty() {
        assert_eq!(SimilarityStore::format_for_context(&[], 1000), "");
    }

    #[test]
    fn format_respects_budget_and_truncates_overflow() {
        let hits = vec![hit(&"a".repeat(2000), 0.95), hit(&"b".repeat(4000), 0.9), hit("c", 0.8)];
        let out = SimilarityStore::format_for_context(&hits, 1000);
        assert!(out.starts_with("## Relevant Past Analyses"));
        assert!(out.contains("### Memory 1 (similarity: 0.95)"));
        assert!(out.contains("### Memory 2 (similarity: 0.90)"));
        assert!(!out.contains("### Memory 3"));
        assert!(out.contains("..."));
        assert!(estimate_tokens(&out) <= 1000);
    }

    #[test]
    fn format_drops_overflow_when_little_budget_remains() {
        let hits = vec![hit(&"a".repeat(3400), 0.95), hit(&"b".repeat(4000), 0.9)];
        let out = SimilarityStore::format_for_context(&hits, 1000);
        assert!(out.contains("### Memory 1"));
        assert!(!out.contains("### Memory 2"));
    }
}
