//! Configuration loading, validation, and management for mnemos.
//!
//! Loads configuration from `~/.mnemos/config.toml` with `MNEMOS_*`
//! environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound on the sum of all per-source context budgets.
pub const MAX_TOTAL_CONTEXT_TOKENS: usize = 100_000;

/// The root configuration structure.
///
/// Maps directly to `~/.mnemos/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MnemosConfig {
    /// Master toggle. When off, every store is skipped.
    #[serde(default = "default_true")]
    pub enable_memory: bool,

    /// Base directory for all persisted memory
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,

    /// Session identifier; a fresh one is generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub summaries: SummaryConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Per-source context budgets
    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub compaction: CompactionConfig,

    /// External model service
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Which similarity backend to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityBackendKind {
    /// SQLite-backed native index, falls back to `Flat` if it cannot open
    Sqlite,
    /// Brute-force in-memory index persisted as flat files
    Flat,
}

impl FromStr for SimilarityBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "flat" => Ok(Self::Flat),
            other => Err(format!("unknown similarity backend '{other}'")),
        }
    }
}

/// Similarity search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_backend")]
    pub backend: SimilarityBackendKind,

    /// Defaults to `{memory_dir}/similarity`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Minimum cosine similarity for a hit
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f64,

    /// Tool results shorter than this are not indexed
    #[serde(default = "default_min_index_chars")]
    pub min_index_chars: usize,
}

/// Summarization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults to `{memory_dir}/summaries.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Trigger summarization every N rounds
    #[serde(default = "default_summary_after_rounds")]
    pub after_rounds: u32,

    #[serde(default = "default_summary_model")]
    pub model: String,

    /// Max output tokens for one summary
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: u32,

    /// Segments estimated below this many tokens are not summarized
    #[serde(default = "default_min_summary_tokens")]
    pub min_segment_tokens: usize,
}

/// Entity graph configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults to `{memory_dir}/knowledge_graph.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default = "default_max_entities")]
    pub max_entities: usize,

    #[serde(default = "default_max_relationships")]
    pub max_relationships: usize,

    /// Fraction of entities/relationships dropped when a ceiling is hit
    #[serde(default = "default_eviction_fraction")]
    pub eviction_fraction: f64,

    /// Run regex extraction over tool results
    #[serde(default = "default_true")]
    pub auto_extract: bool,
}

/// Artifact store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults to `{memory_dir}/artifacts`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_max_artifact_size_mb")]
    pub max_artifact_size_mb: u64,

    /// Reported by stats only; nothing is evicted automatically
    #[serde(default = "default_max_total_artifacts_gb")]
    pub max_total_artifacts_gb: u64,
}

/// Token budgets for each context source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_similarity_tokens")]
    pub similarity_tokens: usize,

    #[serde(default = "default_summary_tokens")]
    pub summary_tokens: usize,

    #[serde(default = "default_graph_tokens")]
    pub graph_tokens: usize,
}

/// Message compaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Recent messages kept verbatim
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Older content above this many tokens is replaced by a pointer
    #[serde(default = "default_pointer_threshold")]
    pub pointer_threshold_tokens: usize,

    /// Per-message cap when older messages are truncated instead
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,
}

/// Which provider implementation serves embeddings and completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible HTTP API
    OpenAi,
    /// Deterministic offline embedder, no completions
    Hash,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "hash" => Ok(Self::Hash),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// External model service configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Timeout for each embedding or completion call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Calls allowed per `rate_window_secs`, per component
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Vector size for the hashed embedder
    #[serde(default = "default_hash_dimension")]
    pub hash_dimension: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_requests", &self.max_requests)
            .field("rate_window_secs", &self.rate_window_secs)
            .field("hash_dimension", &self.hash_dimension)
            .finish()
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_memory_dir() -> PathBuf {
    MnemosConfig::config_dir().join("memory")
}
fn default_backend() -> SimilarityBackendKind {
    SimilarityBackendKind::Sqlite
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_max_results() -> usize {
    5
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_min_index_chars() -> usize {
    100
}
fn default_summary_after_rounds() -> u32 {
    5
}
fn default_summary_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_summary_tokens() -> u32 {
    1000
}
fn default_min_summary_tokens() -> usize {
    500
}
fn default_max_entities() -> usize {
    10_000
}
fn default_max_relationships() -> usize {
    50_000
}
fn default_eviction_fraction() -> f64 {
    0.1
}
fn default_max_artifact_size_mb() -> u64 {
    100
}
fn default_max_total_artifacts_gb() -> u64 {
    10
}
fn default_similarity_tokens() -> usize {
    20_000
}
fn default_summary_tokens() -> usize {
    10_000
}
fn default_graph_tokens() -> usize {
    5_000
}
fn default_keep_recent() -> usize {
    10
}
fn default_pointer_threshold() -> usize {
    1000
}
fn default_truncate_chars() -> usize {
    500
}
fn default_provider_kind() -> ProviderKind {
    ProviderKind::OpenAi
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_max_requests() -> usize {
    60
}
fn default_rate_window_secs() -> u64 {
    60
}
fn default_hash_dimension() -> usize {
    384
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_backend(),
            dir: None,
            embedding_model: default_embedding_model(),
            max_results: default_max_results(),
            threshold: default_similarity_threshold(),
            min_index_chars: default_min_index_chars(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
            after_rounds: default_summary_after_rounds(),
            model: default_summary_model(),
            max_summary_tokens: default_max_summary_tokens(),
            min_segment_tokens: default_min_summary_tokens(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
            max_entities: default_max_entities(),
            max_relationships: default_max_relationships(),
            eviction_fraction: default_eviction_fraction(),
            auto_extract: true,
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_artifact_size_mb: default_max_artifact_size_mb(),
            max_total_artifacts_gb: default_max_total_artifacts_gb(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            similarity_tokens: default_similarity_tokens(),
            summary_tokens: default_summary_tokens(),
            graph_tokens: default_graph_tokens(),
        }
    }
}

impl BudgetConfig {
    pub fn total(&self) -> usize {
        self.similarity_tokens + self.summary_tokens + self.graph_tokens
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            keep_recent: default_keep_recent(),
            pointer_threshold_tokens: default_pointer_threshold(),
            truncate_chars: default_truncate_chars(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_requests: default_max_requests(),
            rate_window_secs: default_rate_window_secs(),
            hash_dimension: default_hash_dimension(),
        }
    }
}

impl Default for MnemosConfig {
    fn default() -> Self {
        Self {
            enable_memory: true,
            memory_dir: default_memory_dir(),
            session_id: None,
            similarity: SimilarityConfig::default(),
            summaries: SummaryConfig::default(),
            graph: GraphConfig::default(),
            artifacts: ArtifactConfig::default(),
            budget: BudgetConfig::default(),
            compaction: CompactionConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl MnemosConfig {
    /// Load configuration from the default location.
    ///
    /// Environment variables with the `MNEMOS_` prefix override file values,
    /// e.g. `MNEMOS_ENABLE_SIMILARITY=false` or `MNEMOS_MEMORY_DIR=/data`.
    /// The API key falls back to `OPENAI_API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `MNEMOS_*` overrides read through `lookup`.
    ///
    /// Values that fail to parse leave the current setting untouched.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let env = EnvReader { lookup: &lookup };

        env.set_bool("MNEMOS_ENABLE_MEMORY", &mut self.enable_memory);
        env.set_bool("MNEMOS_ENABLE_SIMILARITY", &mut self.similarity.enabled);
        env.set_bool("MNEMOS_ENABLE_SUMMARIES", &mut self.summaries.enabled);
        env.set_bool("MNEMOS_ENABLE_GRAPH", &mut self.graph.enabled);
        env.set_bool("MNEMOS_ENABLE_ARTIFACTS", &mut self.artifacts.enabled);

        if let Some(dir) = lookup("MNEMOS_MEMORY_DIR") {
            self.memory_dir = PathBuf::from(dir);
        }
        env.set_path("MNEMOS_SIMILARITY_DIR", &mut self.similarity.dir);
        env.set_path("MNEMOS_ARTIFACTS_DIR", &mut self.artifacts.dir);
        env.set_path("MNEMOS_GRAPH_FILE", &mut self.graph.file);
        env.set_path("MNEMOS_SUMMARIES_FILE", &mut self.summaries.file);

        env.set_parsed("MNEMOS_SIMILARITY_BACKEND", &mut self.similarity.backend);
        env.set_string("MNEMOS_EMBEDDING_MODEL", &mut self.similarity.embedding_model);
        env.set_parsed("MNEMOS_MAX_SIMILARITY_RESULTS", &mut self.similarity.max_results);
        env.set_parsed("MNEMOS_SIMILARITY_THRESHOLD", &mut self.similarity.threshold);
        env.set_parsed("MNEMOS_MIN_INDEX_CHARS", &mut self.similarity.min_index_chars);

        env.set_parsed("MNEMOS_SUMMARY_ROUNDS", &mut self.summaries.after_rounds);
        env.set_string("MNEMOS_SUMMARY_MODEL", &mut self.summaries.model);
        env.set_parsed("MNEMOS_MAX_SUMMARY_TOKENS", &mut self.summaries.max_summary_tokens);

        env.set_parsed("MNEMOS_MAX_ENTITIES", &mut self.graph.max_entities);
        env.set_parsed("MNEMOS_MAX_RELATIONSHIPS", &mut self.graph.max_relationships);
        env.set_parsed("MNEMOS_EVICTION_FRACTION", &mut self.graph.eviction_fraction);
        env.set_bool("MNEMOS_AUTO_EXTRACT_ENTITIES", &mut self.graph.auto_extract);

        env.set_parsed("MNEMOS_MAX_ARTIFACT_SIZE_MB", &mut self.artifacts.max_artifact_size_mb);
        env.set_parsed("MNEMOS_MAX_TOTAL_ARTIFACTS_GB", &mut self.artifacts.max_total_artifacts_gb);

        env.set_parsed("MNEMOS_SIMILARITY_CONTEXT_TOKENS", &mut self.budget.similarity_tokens);
        env.set_parsed("MNEMOS_SUMMARY_CONTEXT_TOKENS", &mut self.budget.summary_tokens);
        env.set_parsed("MNEMOS_GRAPH_CONTEXT_TOKENS", &mut self.budget.graph_tokens);

        env.set_parsed("MNEMOS_PROVIDER", &mut self.provider.kind);
        env.set_string("MNEMOS_BASE_URL", &mut self.provider.base_url);
        env.set_parsed("MNEMOS_REQUEST_TIMEOUT_SECS", &mut self.provider.request_timeout_secs);

        if let Some(session) = lookup("MNEMOS_SESSION_ID").filter(|s| !s.is_empty()) {
            self.session_id = Some(session);
        }

        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("MNEMOS_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mnemos")
    }

    pub fn similarity_dir(&self) -> PathBuf {
        self.similarity
            .dir
            .clone()
            .unwrap_or_else(|| self.memory_dir.join("similarity"))
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.artifacts
            .dir
            .clone()
            .unwrap_or_else(|| self.memory_dir.join("artifacts"))
    }

    pub fn graph_file(&self) -> PathBuf {
        self.graph
            .file
            .clone()
            .unwrap_or_else(|| self.memory_dir.join("knowledge_graph.json"))
    }

    pub fn summaries_file(&self) -> PathBuf {
        self.summaries
            .file
            .clone()
            .unwrap_or_else(|| self.memory_dir.join("summaries.json"))
    }

    /// Per-artifact ceiling in bytes.
    pub fn max_artifact_bytes(&self) -> u64 {
        self.artifacts.max_artifact_size_mb * 1024 * 1024
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enable_memory {
            return Ok(());
        }

        if self.memory_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("memory_dir is not set".into()));
        }

        if !(0.0..=1.0).contains(&self.similarity.threshold) {
            return Err(ConfigError::ValidationError(format!(
                "similarity.threshold must be between 0.0 and 1.0, got {}",
                self.similarity.threshold
            )));
        }

        if !(self.graph.eviction_fraction > 0.0 && self.graph.eviction_fraction <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "graph.eviction_fraction must be in (0.0, 1.0], got {}",
                self.graph.eviction_fraction
            )));
        }

        if self.summaries.after_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "summaries.after_rounds must be > 0".into(),
            ));
        }

        let total = self.budget.total();
        if total > MAX_TOTAL_CONTEXT_TOKENS {
            return Err(ConfigError::ValidationError(format!(
                "Total context budget ({total}) exceeds {MAX_TOTAL_CONTEXT_TOKENS} tokens"
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn set_bool(&self, key: &str, target: &mut bool) {
        if let Some(value) = (self.lookup)(key) {
            *target = matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }
    }

    fn set_string(&self, key: &str, target: &mut String) {
        if let Some(value) = (self.lookup)(key).filter(|v| !v.is_empty()) {
            *target = value;
        }
    }

    fn set_path(&self, key: &str, target: &mut Option<PathBuf>) {
        if let Some(value) = (self.lookup)(key).filter(|v| !v.is_empty()) {
            *target = Some(PathBuf::from(value));
        }
    }

    fn set_parsed<T: FromStr>(&self, key: &str, target: &mut T) {
        if let Some(value) = (self.lookup)(key) {
            match value.trim().parse() {
                Ok(parsed) => *target = parsed,
                Err(_) => tracing::warn!(key, value = %value, "Ignoring unparseable environment override"),
            }
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
