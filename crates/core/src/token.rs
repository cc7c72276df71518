//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Every context
//! formatter measures itself with [`estimate_tokens`], so budgets stay
//! comparable across sources.

use crate::message::Message;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for role name and delimiters.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let overhead = 4;
    let tool_chars: usize = message
        .tool_calls
        .iter()
        .map(|c| c.name.len() + c.arguments.len())
        .sum();
    overhead + estimate_tokens(&message.content) + tool_chars.div_ceil(4)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Cut `text` so that `estimate_tokens` of the result is at most `max_tokens`.
///
/// Truncated output ends in `...`. Cuts fall on char boundaries.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * 4;
    if text.len() <= max_chars {
        return text.to_string();
    }
    if max_chars < 3 {
        return String::new();
    }
    let mut out = truncate_chars(text, max_chars - 3).to_string();
    out.push_str("...");
    out
}

/// Longest prefix of `text` that is at most `max_bytes` long and ends on a char boundary.
pub fn truncate_chars(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Accumulates text blocks under a header without exceeding a token budget.
///
/// Every context formatter renders through one of these, so a source's output
/// is always within its budget. Blocks are separated by a newline.
#[derive(Debug)]
pub struct BudgetWriter {
    buf: String,
    max_chars: usize,
    items: usize,
}

impl BudgetWriter {
    /// Start a section. Returns `None` if the header alone does not fit.
    pub fn new(header: &str, max_tokens: usize) -> Option<Self> {
        let max_chars = max_tokens * 4;
        if header.len() > max_chars {
            return None;
        }
        Some(Self {
            buf: header.to_string(),
            max_chars,
            items: 0,
        })
    }

    /// Tokens still available for a block, separator included.
    pub fn remaining_tokens(&self) -> usize {
        self.max_chars.saturating_sub(self.buf.len() + 1) / 4
    }

    /// Append `block` if it fits. Returns whether it was appended.
    pub fn push(&mut self, block: &str) -> bool {
        if self.buf.len() + 1 + block.len() > self.max_chars {
            return false;
        }
        self.buf.push('\n');
        self.buf.push_str(block);
        self.items += 1;
        true
    }

    /// Number of blocks appended so far.
    pub fn items(&self) -> usize {
        self.items
    }

    /// The rendered section, or an empty string if no block was appended.
    pub fn finish(self) -> String {
        if self.items == 0 {
            return String::new();
        }
        self.buf
    }
}
