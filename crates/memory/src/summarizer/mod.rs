//! Session summarizer: compresses a window of conversation rounds with one
//! completion call.
//!
//! Summaries and per-session trigger bookkeeping persist together in one
//! JSON file. A failed completion leaves both untouched, so the next round
//! retries the same segment.

mod parse;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mnemos_core::error::SummaryError;
use mnemos_core::token::{estimate_tokens, truncate_chars};
use mnemos_core::{BudgetWriter, CompletionRequest, Message, Provider, RateLimiter, Role, SessionSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::persist;

pub use parse::{ParsedSummary, parse};

const PROMPT_TEMPLATE: &str = include_str!("prompts/summary_v1.md");
const HEADER: &str = "## Previous Session Summaries\n";
const RESULT_PREVIEW_CHARS: usize = 500;
const FINDINGS_SHOWN: usize = 5;

#[derive(Debug, Clone)]
pub struct SummarizerOptions {
    /// Rounds between summaries.
    pub after_rounds: u32,
    pub model: String,
    pub max_summary_tokens: u32,
    /// Segments estimated below this are not worth compressing.
    pub min_segment_tokens: usize,
    pub request_timeout: Duration,
}

impl Default for SummarizerOptions {
    fn default() -> Self {
        Self {
            after_rounds: 5,
            model: "gpt-4o-mini".into(),
            max_summary_tokens: 1000,
            min_segment_tokens: 500,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub total_summaries: usize,
    pub sessions: usize,
    pub after_rounds: u32,
    pub total_original_tokens: usize,
    pub total_summary_tokens: usize,
    /// `1 - summary/original` over every stored summary.
    pub overall_compression: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SummaryFile {
    #[serde(default)]
    summaries: HashMap<String, SessionSummary>,
    /// Session id -> end round of its latest summary.
    #[serde(default)]
    last_summarized_round: HashMap<String, u32>,
}

/// The summarizer.
pub struct Summarizer {
    file: PathBuf,
    options: SummarizerOptions,
    provider: Arc<dyn Provider>,
    limiter: Arc<RateLimiter>,
    state: RwLock<SummaryFile>,
}

impl Summarizer {
    /// Load summaries from `file`. A missing or corrupt file starts empty.
    pub fn open(
        file: impl Into<PathBuf>,
        options: SummarizerOptions,
        provider: Arc<dyn Provider>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let file = file.into();
        let state: SummaryFile = persist::load_json_or_default(&file, "session summaries");
        info!(path = %file.display(), summaries = state.summaries.len(), "Summaries loaded");
        Self {
            file,
            options,
            provider,
            limiter,
            state: RwLock::new(state),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn after_rounds(&self) -> u32 {
        self.options.after_rounds
    }

    fn save(&self, state: &SummaryFile) -> Result<(), SummaryError> {
        persist::write_json_atomic(&self.file, state)
            .map_err(|e| SummaryError::Storage(format!("Cannot write {}: {e}", self.file.display())))
    }

    /// End round of the latest summary for `session_id`, 0 if none.
    pub async fn last_summarized_round(&self, session_id: &str) -> u32 {
        self.state
            .read()
            .await
            .last_summarized_round
            .get(session_id)
            .copied()
            .unwrap_or(0)
    }

    /// Whether `current_round` is far enough past the last summary.
    pub async fn should_summarize(&self, session_id: &str, current_round: u32) -> bool {
        let last = self.last_summarized_round(session_id).await;
        current_round.saturating_sub(last) >= self.options.after_rounds
    }

    /// Compress `messages` (rounds `start_round..=end_round`) into a stored summary.
    pub async fn summarize(
        &self,
        messages: &[Message],
        start_round: u32,
        end_round: u32,
        session_id: &str,
        tools_used: &[String],
    ) -> Result<SessionSummary, SummaryError> {
        let last_round = self.last_summarized_round(session_id).await;
        if end_round <= last_round {
            return Err(SummaryError::StaleRound { last_round, end_round });
        }

        let transcript = transcript(messages);
        if transcript.is_empty() {
            return Err(SummaryError::EmptySegment);
        }
        let original_tokens = estimate_tokens(&transcript);
        if original_tokens < self.options.min_segment_tokens {
            return Err(SummaryError::TooShort {
                tokens: original_tokens,
                minimum: self.options.min_segment_tokens,
            });
        }

        let prompt = build_prompt(&transcript, tools_used);
        let response = self.complete(prompt).await?;
        let parsed = parse(&response);

        let summary = SessionSummary {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            start_round,
            end_round,
            summary_text: parsed.summary,
            key_findings: parsed.key_findings,
            tools_used: tools_used.to_vec(),
            entities_mentioned: parsed.entities,
            artifacts_created: parsed.artifacts,
            token_count_original: original_tokens,
            token_count_summary: estimate_tokens(&response),
            created_at: Utc::now(),
        };

        let mut state = self.state.write().await;
        let last_round = state.last_summarized_round.get(session_id).copied().unwrap_or(0);
        if end_round <= last_round {
            // Another caller summarized this range while we waited on the model.
            return Err(SummaryError::StaleRound { last_round, end_round });
        }
        state.summaries.insert(summary.id.clone(), summary.clone());
        state.last_summarized_round.insert(session_id.to_string(), end_round);
        if let Err(e) = self.save(&state) {
            state.summaries.remove(&summary.id);
            if last_round == 0 {
                state.last_summarized_round.remove(session_id);
            } else {
                state.last_summarized_round.insert(session_id.to_string(), last_round);
            }
            return Err(e);
        }

        info!(
            session = session_id,
            rounds = %format!("{start_round}-{end_round}"),
            compression = summary.compression_ratio(),
            "Segment summarized"
        );
        Ok(summary)
    }

    async fn complete(&self, prompt: String) -> Result<String, SummaryError> {
        let mut request = CompletionRequest::prompt(&self.options.model, prompt, self.options.max_summary_tokens);
        request.temperature = 0.0;

        // The limiter wait counts against the request timeout.
        let call = async {
            self.limiter.acquire().await;
            self.provider.complete(request).await
        };
        match tokio::time::timeout(self.options.request_timeout, call).await {
            Ok(Ok(response)) => Ok(response.text),
            Ok(Err(e)) => {
                warn!(provider = self.provider.name(), error = %e, "Summary completion failed");
                Err(SummaryError::Completion(e.to_string()))
            }
            Err(_) => {
                let secs = self.options.request_timeout.as_secs();
                warn!(provider = self.provider.name(), timeout_secs = secs, "Summary completion timed out");
                Err(SummaryError::Timeout(secs))
            }
        }
    }

    /// Up to `max` summaries, latest rounds first, optionally for one session.
    pub async fn get_context_summaries(&self, session_id: Option<&str>, max: usize) -> Vec<SessionSummary> {
        let state = self.state.read().await;
        let mut found: Vec<&SessionSummary> = state
            .summaries
            .values()
            .filter(|s| session_id.is_none_or(|id| s.session_id == id))
            .collect();
        found.sort_by(|a, b| b.end_round.cmp(&a.end_round).then(b.created_at.cmp(&a.created_at)));
        found.into_iter().take(max).cloned().collect()
    }

    /// Render `summaries` in order, stopping at the first that does not fit.
    pub fn format_for_context(summaries: &[SessionSummary], max_tokens: usize) -> String {
        let Some(mut out) = BudgetWriter::new(HEADER, max_tokens) else {
            return String::new();
        };
        for summary in summaries {
            let mut block = format!(
                "### Rounds {}-{}\n{}\n",
                summary.start_round, summary.end_round, summary.summary_text
            );
            if !summary.key_findings.is_empty() {
                block.push_str("\n**Key Findings:**\n");
                for finding in summary.key_findings.iter().take(FINDINGS_SHOWN) {
                    block.push_str("- ");
                    block.push_str(finding);
                    block.push('\n');
                }
            }
            if !out.push(&block) {
                break;
            }
        }
        out.finish()
    }

    /// Every stored summary, newest first.
    pub async fn all_summaries(&self) -> Vec<SessionSummary> {
        let state = self.state.read().await;
        let mut all: Vec<SessionSummary> = state.summaries.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.summaries.len()
    }

    pub async fn delete_summary(&self, id: &str) -> Result<bool, SummaryError> {
        let mut state = self.state.write().await;
        if state.summaries.remove(id).is_none() {
            return Ok(false);
        }
        self.save(&state)?;
        Ok(true)
    }

    /// Drop a session's summaries and restart its round counting.
    pub async fn clear_session(&self, session_id: &str) -> Result<usize, SummaryError> {
        let mut state = self.state.write().await;
        let before = state.summaries.len();
        state.summaries.retain(|_, s| s.session_id != session_id);
        state.last_summarized_round.remove(session_id);
        let removed = before - state.summaries.len();
        self.save(&state)?;
        debug!(session = session_id, removed, "Session summaries cleared");
        Ok(removed)
    }

    pub async fn stats(&self) -> SummaryStats {
        let state = self.state.read().await;
        let total_original_tokens: usize = state.summaries.values().map(|s| s.token_count_original).sum();
        let total_summary_tokens: usize = state.summaries.values().map(|s| s.token_count_summary).sum();
        let sessions: BTreeSet<&str> = state.summaries.values().map(|s| s.session_id.as_str()).collect();
        SummaryStats {
            total_summaries: state.summaries.len(),
            sessions: sessions.len(),
            after_rounds: self.options.after_rounds,
            total_original_tokens,
            total_summary_tokens,
            overall_compression: if total_original_tokens > 0 {
                1.0 - total_summary_tokens as f64 / total_original_tokens as f64
            } else {
                0.0
            },
        }
    }
}

/// Flatten messages into `ROLE: text` paragraphs. Tool calls and results are abbreviated.
pub fn transcript(messages: &[Message]) -> String {
    let mut parts = Vec::with_capacity(messages.len());
    for message in messages {
        let mut pieces: Vec<String> = Vec::new();
        let text = message.content.trim();

        match message.role {
            Role::Tool if !text.is_empty() => {
                let preview = truncate_chars(text, RESULT_PREVIEW_CHARS);
                let ellipsis = if preview.len() < text.len() { "..." } else { "" };
                pieces.push(format!("[Result: {preview}{ellipsis}]"));
            }
            _ if !text.is_empty() => pieces.push(text.to_string()),
            _ => {}
        }
        for call in &message.tool_calls {
            pieces.push(format!("[Tool: {}]", call.name));
        }

        if !pieces.is_empty() {
            parts.push(format!("{}: {}", message.role.as_str().to_uppercase(), pieces.join("\n")));
        }
    }
    parts.join("\n\n")
}

fn build_prompt(transcript: &str, tools_used: &[String]) -> String {
    let tools = if tools_used.is_empty() {
        "None".to_string()
    } else {
        tools_used.join(", ")
    };
    PROMPT_TEMPLATE
        .replace("{tools}", &tools)
        .replace("{conversation}", transcript)
}
