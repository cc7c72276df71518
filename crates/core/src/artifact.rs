//! Artifact records: persisted intermediate results.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Metadata;

/// Declared kind of an artifact. Drives the on-disk file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Dataframe,
    Plot,
    Sequence,
    Code,
    AnalysisResult,
    Alignment,
    Structure,
    Tree,
    Network,
    Table,
    Text,
    Json,
    Other,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 13] = [
        Self::Dataframe,
        Self::Plot,
        Self::Sequence,
        Self::Code,
        Self::AnalysisResult,
        Self::Alignment,
        Self::Structure,
        Self::Tree,
        Self::Network,
        Self::Table,
        Self::Text,
        Self::Json,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataframe => "dataframe",
            Self::Plot => "plot",
            Self::Sequence => "sequence",
            Self::Code => "code",
            Self::AnalysisResult => "analysis_result",
            Self::Alignment => "alignment",
            Self::Structure => "structure",
            Self::Tree => "tree",
            Self::Network => "network",
            Self::Table => "table",
            Self::Text => "text",
            Self::Json => "json",
            Self::Other => "other",
        }
    }

    /// File extension (with leading dot) used for the data file.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Dataframe => ".csv",
            Self::Plot => ".png",
            Self::Sequence => ".fasta",
            Self::Code => ".py",
            Self::AnalysisResult | Self::Network | Self::Json => ".json",
            Self::Alignment => ".aln",
            Self::Structure => ".pdb",
            Self::Tree => ".nwk",
            Self::Table => ".tsv",
            Self::Text => ".txt",
            Self::Other => ".dat",
        }
    }
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient: unknown labels become [`ArtifactType::Other`].
impl FromStr for ArtifactType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Ok(Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(Self::Other))
    }
}

/// Metadata for one stored artifact. The content lives at `file_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub description: String,
    pub file_path: PathBuf,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_tool: String,
    #[serde(default)]
    pub source_query: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
}

impl Artifact {
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count += 1;
    }

    /// Case-insensitive substring match over name, description, and tags.
    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_follow_type() {
        assert_eq!(ArtifactType::Dataframe.extension(), ".csv");
        assert_eq!(ArtifactType::Plot.extension(), ".png");
        assert_eq!(ArtifactType::Tree.extension(), ".nwk");
        assert_eq!(ArtifactType::Network.extension(), ".json");
        assert_eq!(ArtifactType::Other.extension(), ".dat");
    }

    #[test]
    fn artifact_type_parse_is_lenient() {
        assert_eq!("analysis_result".parse::<ArtifactType>().unwrap(), ArtifactType::AnalysisResult);
        assert_eq!("hologram".parse::<ArtifactType>().unwrap(), ArtifactType::Other);
    }

    #[test]
    fn matches_text_checks_tags() {
        let now = Utc::now();
        let a = Artifact {
            id: "x".into(),
            name: "expression".into(),
            artifact_type: ArtifactType::Table,
            description: "RNA-seq counts".into(),
            file_path: PathBuf::from("x.tsv"),
            tags: vec!["Liver".into()],
            source_tool: String::new(),
            source_query: String::new(),
            metadata: Metadata::new(),
            size_bytes: 10,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        };
        assert!(a.matches_text("liver"));
        assert!(a.matches_text("rna-seq"));
        assert!(!a.matches_text("kidney"));
    }
}
