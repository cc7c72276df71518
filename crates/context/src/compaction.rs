//! Message-history compaction for memory pressure.
//!
//! Separate from context assembly: assembly adds remembered text, compaction
//! removes conversation text. The most recent messages always survive
//! verbatim.

use mnemos_config::CompactionConfig;
use mnemos_core::token::{estimate_messages_tokens, estimate_tokens, truncate_chars};
use mnemos_core::{Message, Role};

const TRUNCATION_MARKER: &str = "... [truncated]";

/// How older messages are replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OlderHistory {
    /// One pointer message stands in for all of them.
    Pointer,
    /// Each is kept but cut to the character cap.
    Truncate,
}

/// Pick the strategy for the older part of a history.
///
/// A pointer is only useful when summaries exist to point at: either one
/// was already written this session, or the older text is large enough
/// that the summarizer will cover it.
pub fn older_strategy(
    summaries_available: bool,
    has_summary: bool,
    older_tokens: usize,
    config: &CompactionConfig,
) -> OlderHistory {
    if summaries_available && (has_summary || older_tokens > config.pointer_threshold_tokens) {
        OlderHistory::Pointer
    } else {
        OlderHistory::Truncate
    }
}

/// Shrink `messages` if they exceed `max_tokens`. Returns them unchanged otherwise.
pub fn compact(
    messages: &[Message],
    max_tokens: usize,
    config: &CompactionConfig,
    summaries_available: bool,
    has_summary: bool,
) -> Vec<Message> {
    if estimate_messages_tokens(messages) <= max_tokens {
        return messages.to_vec();
    }

    let split = messages.len().saturating_sub(config.keep_recent);
    let (older, recent) = messages.split_at(split);
    if older.is_empty() {
        return messages.to_vec();
    }

    let older_tokens: usize = older.iter().map(|m| estimate_tokens(&m.content)).sum();
    let mut compacted = Vec::with_capacity(recent.len() + older.len());

    match older_strategy(summaries_available, has_summary, older_tokens, config) {
        OlderHistory::Pointer => compacted.push(pointer(older.len())),
        OlderHistory::Truncate => {
            compacted.extend(older.iter().map(|m| truncate_message(m, config.truncate_chars)));
        }
    }
    compacted.extend_from_slice(recent);

    tracing::debug!(
        before = messages.len(),
        after = compacted.len(),
        "Compacted message history"
    );
    compacted
}

fn pointer(count: usize) -> Message {
    Message {
        role: Role::User,
        content: format!("[Previous conversation ({count} messages) summarized - see memory context for details]"),
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

fn truncate_message(message: &Message, max_chars: usize) -> Message {
    let mut out = message.clone();
    if out.content.len() > max_chars {
        out.content = format!("{}{TRUNCATION_MARKER}", truncate_chars(&message.content, max_chars));
    }
    out
}
