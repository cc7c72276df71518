//! Compressed conversation segments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured summary of rounds `start_round..=end_round` of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub session_id: String,
    pub start_round: u32,
    pub end_round: u32,
    #[serde(rename = "summary")]
    pub summary_text: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub entities_mentioned: Vec<String>,
    #[serde(default)]
    pub artifacts_created: Vec<String>,
    pub token_count_original: usize,
    pub token_count_summary: usize,
    pub created_at: DateTime<Utc>,
}

impl SessionSummary {
    /// `1 - summary/original`, or 0 when the original was empty.
    pub fn compression_ratio(&self) -> f64 {
        if self.token_count_original == 0 {
            return 0.0;
        }
        1.0 - self.token_count_summary as f64 / self.token_count_original as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(original: usize, compressed: usize) -> SessionSummary {
        SessionSummary {
            id: "s".into(),
            session_id: "sess".into(),
            start_round: 1,
            end_round: 5,
            summary_text: "text".into(),
            key_findings: vec![],
            tools_used: vec![],
            entities_mentioned: vec![],
            artifacts_created: vec![],
            token_count_original: original,
            token_count_summary: compressed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn compression_ratio_is_fraction_saved() {
        assert!((summary(1000, 250).compression_ratio() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn compression_ratio_zero_original() {
        assert_eq!(summary(0, 10).compression_ratio(), 0.0);
    }
}
