//! Agent-facing memory tools.
//!
//! Each method renders its result as display text for a model to read.
//! Failures become text too; nothing here returns an error.

use std::collections::HashMap;
use std::fmt::Write as _;

use mnemos_core::token::truncate_chars;
use mnemos_core::{ArtifactType, EntityType};
use mnemos_memory::{ArtifactContent, ArtifactData, ArtifactFilter, Direction, NewArtifact, SimilarityQuery, human_size};

use crate::manager::ContextManager;

const LISTED_ARTIFACTS: usize = 20;
const DESCRIPTION_PREVIEW_CHARS: usize = 50;
const READ_PREVIEW_CHARS: usize = 5000;
const ENTITY_LIMIT: usize = 20;
const ENTITIES_WITH_RELATIONSHIPS: usize = 5;
const NEIGHBOR_LIMIT: usize = 5;

impl ContextManager {
    /// Semantic search over indexed tool results and analyses.
    pub async fn search_memory(&self, query: &str, max_results: usize) -> String {
        let Some(store) = &self.stores.similarity else {
            return "Memory search not available (similarity search disabled)".into();
        };

        let hits = match store.search(&SimilarityQuery::new(query).limit(max_results)).await {
            Ok(hits) => hits,
            Err(e) => return format!("Memory search failed: {e}"),
        };
        if hits.is_empty() {
            return "No relevant results found in memory.".into();
        }

        let mut out = format!("Found {} relevant memory item(s):\n", hits.len());
        for (i, hit) in hits.iter().enumerate() {
            let _ = write!(
                out,
                "\n--- Result {} (similarity: {:.2}) ---\nSource: {}\n\n{}\n",
                i + 1,
                hit.similarity,
                hit.record.source_label,
                hit.record.content
            );
        }
        out
    }

    /// Save content supplied by the agent. `artifact_type` is parsed leniently.
    pub async fn save_artifact(
        &self,
        name: &str,
        content: ArtifactContent,
        artifact_type: &str,
        description: &str,
        tags: Vec<String>,
    ) -> String {
        let Some(store) = &self.stores.artifacts else {
            return "Artifact storage not available (disabled)".into();
        };

        let Ok(artifact_type) = artifact_type.parse::<ArtifactType>();
        let new = NewArtifact::new(name, content, artifact_type, description)
            .tags(tags)
            .source_tool("manual");

        match store.save(new).await {
            Ok(artifact) => format!(
                "Artifact saved successfully:\n  ID: {}\n  Name: {}\n  Type: {}\n  Path: {}\n  Size: {}",
                artifact.id,
                artifact.name,
                artifact.artifact_type,
                artifact.file_path.display(),
                human_size(artifact.size_bytes)
            ),
            Err(e) => format!("Failed to save artifact: {e}"),
        }
    }

    /// Artifacts matching an optional type and text query, newest first.
    pub async fn list_artifacts(&self, artifact_type: Option<&str>, query: Option<&str>) -> String {
        let Some(store) = &self.stores.artifacts else {
            return "Artifact storage not available (disabled)".into();
        };

        let filter = ArtifactFilter {
            query: query.map(str::to_string),
            artifact_type: artifact_type.map(|t| {
                let Ok(parsed) = t.parse::<ArtifactType>();
                parsed
            }),
            limit: LISTED_ARTIFACTS,
            ..ArtifactFilter::default()
        };
        let artifacts = store.find(&filter).await;
        if artifacts.is_empty() {
            return "No artifacts found.".into();
        }

        let mut out = format!("Found {} artifact(s):", artifacts.len());
        for a in &artifacts {
            let desc = truncate_chars(&a.description, DESCRIPTION_PREVIEW_CHARS);
            let ellipsis = if desc.len() < a.description.len() { "..." } else { "" };
            let _ = write!(out, "\n  - [{}] {} ({}) - {desc}{ellipsis}", a.id, a.name, a.artifact_type);
        }
        out
    }

    /// Entities matching an optional query and type, optionally with their
    /// relationships.
    pub async fn get_entities(
        &self,
        query: Option<&str>,
        entity_type: Option<&str>,
        include_relationships: bool,
    ) -> String {
        let Some(graph) = &self.stores.graph else {
            return "Entity graph not available (disabled)".into();
        };

        let entity_type = entity_type.map(|t| {
            let Ok(parsed) = t.parse::<EntityType>();
            parsed
        });
        let entities = graph.find_entities(query, entity_type, ENTITY_LIMIT).await;
        if entities.is_empty() {
            return "No entities found.".into();
        }

        let mut out = format!("Found {} entity/entities:", entities.len());
        for e in &entities {
            let _ = write!(out, "\n  - [{}] {}", e.entity_type, e.name);
            if !e.aliases.is_empty() {
                let _ = write!(out, " (also: {})", e.aliases.join(", "));
            }
        }

        if include_relationships {
            for e in entities.iter().take(ENTITIES_WITH_RELATIONSHIPS) {
                let Some(neighbors) = graph.get_neighbors(&e.name, None, Direction::Both, NEIGHBOR_LIMIT).await
                else {
                    continue;
                };
                if neighbors.relationships.is_empty() {
                    continue;
                }

                let names: HashMap<&str, &str> = neighbors
                    .entity
                    .iter()
                    .chain(&neighbors.entities)
                    .map(|n| (n.id.as_str(), n.name.as_str()))
                    .collect();
                let name_of = |id: &str| names.get(id).copied().unwrap_or("?").to_string();

                let _ = write!(out, "\n\nRelationships for {}:", e.name);
                for r in &neighbors.relationships {
                    let _ = write!(
                        out,
                        "\n  {} --[{}]--> {}",
                        name_of(&r.source_id),
                        r.relationship_type,
                        name_of(&r.target_id)
                    );
                }
            }
        }
        out
    }

    /// Artifact content as text, truncated for display.
    pub async fn read_artifact(&self, artifact_id: &str) -> String {
        let Some(store) = &self.stores.artifacts else {
            return "Artifact storage not available (disabled)".into();
        };

        match store.read(artifact_id).await {
            Ok(ArtifactData::Text(text)) => {
                if text.len() > READ_PREVIEW_CHARS {
                    format!("{}\n... (truncated)", truncate_chars(&text, READ_PREVIEW_CHARS))
                } else {
                    text
                }
            }
            Ok(ArtifactData::Bytes(bytes)) => format!("Binary artifact ({})", human_size(bytes.len() as u64)),
            Err(e) => format!("Failed to read artifact: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use mnemos_config::MnemosConfig;
    use mnemos_memory::{ArtifactOptions, ArtifactStore, EntityGraph, GraphOptions, NewRelationship};
    use mnemos_core::{Metadata, RelationshipType};

    use super::*;
    use crate::manager::Stores;

    fn manager(dir: &std::path::Path) -> ContextManager {
        let stores = Stores {
            graph: Some(EntityGraph::open(dir.join("graph.json"), GraphOptions::default())),
            artifacts: Some(ArtifactStore::open(dir.join("artifacts"), ArtifactOptions::default()).unwrap()),
            ..Stores::default()
        };
        ContextManager::new(MnemosConfig::default(), "session-under-test", stores)
    }

    #[tokio::test]
    async fn disabled_stores_say_so() {
        let m = ContextManager::new(MnemosConfig::default(), "s", Stores::default());
        assert!(m.search_memory("TP53", 5).await.contains("not available"));
        assert!(m.list_artifacts(None, None).await.contains("not available"));
        assert!(m.get_entities(None, None, false).await.contains("not available"));
        assert!(m.read_artifact("x").await.contains("not available"));
    }

    #[tokio::test]
    async fn save_list_and_read_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());

        let saved = m
            .save_artifact(
                "blast hits",
                "query,subject\nTP53,P04637\n".into(),
                "table",
                "BLAST hits for the TP53 query sequence against swissprot",
                vec!["blast".into()],
            )
            .await;
        assert!(saved.starts_with("Artifact saved successfully:"));
        assert!(saved.contains("Type: table"));

        let listed = m.list_artifacts(Some("table"), Some("blast")).await;
        assert!(listed.starts_with("Found 1 artifact(s):"));
        assert!(listed.contains("BLAST hits for the TP53 query sequence against swi..."));

        let id = listed.split('[').nth(1).and_then(|s| s.split(']').next()).unwrap();
        assert_eq!(m.read_artifact(id).await, "query,subject\nTP53,P04637\n");
        assert_eq!(m.list_artifacts(Some("plot"), None).await, "No artifacts found.");
    }

    #[tokio::test]
    async fn long_artifact_is_truncated_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let artifact = m
            .stores
            .artifacts
            .as_ref()
            .unwrap()
            .save(NewArtifact::new("big", "a".repeat(6000), ArtifactType::Text, "long"))
            .await
            .unwrap();

        let out = m.read_artifact(&artifact.id).await;
        assert!(out.ends_with("\n... (truncated)"));
        assert_eq!(out.len(), READ_PREVIEW_CHARS + "\n... (truncated)".len());
    }

    #[tokio::test]
    async fn missing_artifact_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        assert!(m.read_artifact("nope").await.starts_with("Failed to read artifact"));
    }

    #[tokio::test]
    async fn entities_with_relationships_use_names() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let graph = m.stores.graph.as_ref().unwrap();
        graph
            .add_entity("TP53", EntityType::Gene, "ncbi", Metadata::new(), &["p53".to_string()])
            .await
            .unwrap();
        graph
            .add_relationship(NewRelationship::new(
                "TP53",
                "MDM2",
                RelationshipType::InteractsWith,
                "string_db",
            ))
            .await
            .unwrap();

        let out = m.get_entities(Some("tp53"), None, true).await;
        assert!(out.starts_with("Found 1 entity/entities:"));
        assert!(out.contains("  - [gene] TP53 (also: p53)"));
        assert!(out.contains("Relationships for TP53:"));
        assert!(out.contains("TP53 --[interacts_with]--> MDM2"));

        let genes_only = m.get_entities(None, Some("gene"), false).await;
        assert!(!genes_only.contains("MDM2"));
    }
}
