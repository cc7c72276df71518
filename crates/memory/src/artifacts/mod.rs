//! Artifact store: intermediate results persisted one file per artifact.
//!
//! Files live in the artifacts directory next to an `index.json` manifest
//! mapping id to metadata. Ids combine a sanitized name prefix, a
//! microsecond timestamp, and a truncated SHA-256 of content, name, and
//! timestamp, so saving identical content twice yields two artifacts.
//!
//! Only the per-artifact ceiling is enforced. The total quota is reported
//! in [`ArtifactStats`] and logged, never applied.

mod serialize;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::Utc;
use mnemos_core::entity::sanitize_name;
use mnemos_core::error::ArtifactError;
use mnemos_core::{Artifact, ArtifactType, Metadata};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::persist;

pub use serialize::{ArtifactContent, ArtifactData, Exportable};

const INDEX_FILE: &str = "index.json";

/// Size limits.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactOptions {
    pub max_artifact_bytes: u64,
    /// Advisory only.
    pub quota_bytes: Option<u64>,
}

impl Default for ArtifactOptions {
    fn default() -> Self {
        Self {
            max_artifact_bytes: 100 * 1024 * 1024,
            quota_bytes: None,
        }
    }
}

/// An artifact to save.
#[derive(Debug)]
pub struct NewArtifact {
    pub name: String,
    pub content: ArtifactContent,
    pub artifact_type: ArtifactType,
    pub description: String,
    pub tags: Vec<String>,
    pub source_tool: String,
    pub source_query: String,
    pub metadata: Metadata,
}

impl NewArtifact {
    pub fn new(
        name: impl Into<String>,
        content: impl Into<ArtifactContent>,
        artifact_type: ArtifactType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            artifact_type,
            description: description.into(),
            tags: Vec::new(),
            source_tool: String::new(),
            source_query: String::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn source_tool(mut self, tool: impl Into<String>) -> Self {
        self.source_tool = tool.into();
        self
    }

    pub fn source_query(mut self, query: impl Into<String>) -> Self {
        self.source_query = query.into();
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Criteria for [`ArtifactStore::find`]. Empty fields match everything.
#[derive(Debug, Clone)]
pub struct ArtifactFilter {
    /// Case-insensitive substring over name, description, and tags.
    pub query: Option<String>,
    pub artifact_type: Option<ArtifactType>,
    /// Matches if the artifact carries any of these.
    pub tags: Vec<String>,
    pub source_tool: Option<String>,
    pub limit: usize,
}

impl Default for ArtifactFilter {
    fn default() -> Self {
        Self {
            query: None,
            artifact_type: None,
            tags: Vec::new(),
            source_tool: None,
            limit: 20,
        }
    }
}

impl ArtifactFilter {
    fn matches(&self, artifact: &Artifact, needle: Option<&str>) -> bool {
        self.artifact_type.is_none_or(|t| artifact.artifact_type == t)
            && self
                .source_tool
                .as_deref()
                .is_none_or(|tool| artifact.source_tool == tool)
            && (self.tags.is_empty() || self.tags.iter().any(|t| artifact.tags.contains(t)))
            && needle.is_none_or(|q| artifact.matches_text(q))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStats {
    pub total_artifacts: usize,
    pub total_size_bytes: u64,
    pub by_type: BTreeMap<String, usize>,
    pub quota_bytes: Option<u64>,
    pub dir: PathBuf,
}

impl ArtifactStats {
    pub fn over_quota(&self) -> bool {
        self.quota_bytes.is_some_and(|q| self.total_size_bytes > q)
    }
}

/// The artifact store.
pub struct ArtifactStore {
    dir: PathBuf,
    index_file: PathBuf,
    options: ArtifactOptions,
    index: RwLock<HashMap<String, Artifact>>,
}

impl ArtifactStore {
    /// Open the store in `dir`, creating it if needed. A corrupt index loads empty.
    pub fn open(dir: impl Into<PathBuf>, options: ArtifactOptions) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ArtifactError::Io(format!("Cannot create {}: {e}", dir.display())))?;
        let index_file = dir.join(INDEX_FILE);
        let index: HashMap<String, Artifact> = persist::load_json_or_default(&index_file, "artifact index");
        info!(path = %dir.display(), artifacts = index.len(), "Artifact store loaded");
        Ok(Self {
            dir,
            index_file,
            options,
            index: RwLock::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save_index(&self, index: &HashMap<String, Artifact>) -> Result<(), ArtifactError> {
        persist::write_json_atomic(&self.index_file, index)
            .map_err(|e| ArtifactError::Io(format!("Cannot write artifact index: {e}")))
    }

    /// Serialize, size-check, and persist a new artifact.
    ///
    /// Nothing is written if serialization fails or the encoded content is
    /// over the per-artifact ceiling.
    pub async fn save(&self, new: NewArtifact) -> Result<Artifact, ArtifactError> {
        let bytes = new.content.to_bytes()?;
        let size = bytes.len() as u64;
        if size > self.options.max_artifact_bytes {
            return Err(ArtifactError::TooLarge {
                size,
                limit: self.options.max_artifact_bytes,
            });
        }

        let mut index = self.index.write().await;

        let mut id = generate_id(&new.name, &bytes);
        while index.contains_key(&id) {
            id = generate_id(&new.name, &bytes);
        }
        let file_path = self.dir.join(format!("{id}{}", new.artifact_type.extension()));

        persist::write_atomic(&file_path, &bytes)
            .map_err(|e| ArtifactError::Io(format!("Cannot write {}: {e}", file_path.display())))?;

        let now = Utc::now();
        let artifact = Artifact {
            id: id.clone(),
            name: new.name,
            artifact_type: new.artifact_type,
            description: new.description,
            file_path,
            tags: new.tags,
            source_tool: new.source_tool,
            source_query: new.source_query,
            metadata: new.metadata,
            size_bytes: size,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        };
        index.insert(id.clone(), artifact.clone());

        if let Err(e) = self.save_index(&index) {
            index.remove(&id);
            let _ = std::fs::remove_file(&artifact.file_path);
            return Err(e);
        }

        if let Some(quota) = self.options.quota_bytes {
            let total: u64 = index.values().map(|a| a.size_bytes).sum();
            if total > quota {
                warn!(total_bytes = total, quota_bytes = quota, "Artifact storage over quota");
            }
        }

        info!(id = %artifact.id, kind = %artifact.artifact_type, size_bytes = size, "Artifact saved");
        Ok(artifact)
    }

    /// Content of an artifact: text when it decodes as UTF-8, bytes otherwise.
    pub async fn read(&self, id: &str) -> Result<ArtifactData, ArtifactError> {
        let mut index = self.index.write().await;
        let artifact = index
            .get_mut(id)
            .ok_or_else(|| ArtifactError::NotFound(id.to_string()))?;

        let bytes = std::fs::read(&artifact.file_path).map_err(|e| {
            ArtifactError::Io(format!("Cannot read {}: {e}", artifact.file_path.display()))
        })?;
        artifact.touch();

        if let Err(e) = self.save_index(&index) {
            warn!(error = %e, "Could not record artifact access");
        }
        Ok(ArtifactData::from_bytes(bytes))
    }

    /// Metadata of an artifact. Records the access.
    pub async fn get(&self, id: &str) -> Result<Option<Artifact>, ArtifactError> {
        let mut index = self.index.write().await;
        let Some(artifact) = index.get_mut(id) else {
            return Ok(None);
        };
        artifact.touch();
        let artifact = artifact.clone();
        self.save_index(&index)?;
        Ok(Some(artifact))
    }

    /// Artifacts matching `filter`, most recently accessed first.
    pub async fn find(&self, filter: &ArtifactFilter) -> Vec<Artifact> {
        let needle = filter.query.as_deref().map(str::to_lowercase).filter(|q| !q.is_empty());
        let index = self.index.read().await;
        let mut found: Vec<&Artifact> = index
            .values()
            .filter(|a| filter.matches(a, needle.as_deref()))
            .collect();
        found.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed).then(b.created_at.cmp(&a.created_at)));
        found.into_iter().take(filter.limit).cloned().collect()
    }

    pub async fn list(&self, artifact_type: Option<ArtifactType>, limit: usize) -> Vec<Artifact> {
        self.find(&ArtifactFilter {
            artifact_type,
            limit,
            ..Default::default()
        })
        .await
    }

    /// Remove an artifact and its file. Returns false if the id is unknown.
    pub async fn delete(&self, id: &str) -> Result<bool, ArtifactError> {
        let mut index = self.index.write().await;
        let Some(artifact) = index.get(id) else {
            return Ok(false);
        };

        match std::fs::remove_file(&artifact.file_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ArtifactError::Io(format!(
                    "Cannot delete {}: {e}",
                    artifact.file_path.display()
                )));
            }
        }

        index.remove(id);
        self.save_index(&index)?;
        debug!(id, "Artifact deleted");
        Ok(true)
    }

    pub async fn count(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn stats(&self) -> ArtifactStats {
        let index = self.index.read().await;
        let mut by_type = BTreeMap::new();
        for a in index.values() {
            *by_type.entry(a.artifact_type.as_str().to_string()).or_insert(0) += 1;
        }
        ArtifactStats {
            total_artifacts: index.len(),
            total_size_bytes: index.values().map(|a| a.size_bytes).sum(),
            by_type,
            quota_bytes: self.options.quota_bytes,
            dir: self.dir.clone(),
        }
    }
}

/// `{name}_{timestamp}_{hash12}`.
fn generate_id(name: &str, content: &[u8]) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%6f").to_string();
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.update(name.as_bytes());
    hasher.update(timestamp.as_bytes());
    let digest = hasher.finalize();
    let hash: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();

    let prefix = sanitize_name(name, 20);
    let prefix = if prefix.is_empty() { "artifact".to_string() } else { prefix };
    format!("{prefix}_{timestamp}_{hash}")
}

/// `1536` -> `1.5 KB`.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(dir: &Path) -> ArtifactStore {
        ArtifactStore::open(dir.join("artifacts"), ArtifactOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn save_and_read_text() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let a = s
            .save(NewArtifact::new(">seq1\nACGT", ">seq1\nACGT", ArtifactType::Sequence, "a sequence"))
            .await
            .unwrap();
        assert!(a.file_path.to_string_lossy().ends_with(".fasta"));
        assert_eq!(a.size_bytes, 11);
        assert_eq!(s.read(&a.id).await.unwrap(), ArtifactData::Text(">seq1\nACGT".into()));
    }

    #[tokio::test]
    async fn every_kind_reads_back_its_canonical_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let contents = vec![
            (ArtifactContent::Text("plain".into()), ArtifactType::Text),
            (ArtifactContent::Bytes(vec![0, 159, 146, 150]), ArtifactType::Plot),
            (ArtifactContent::Json(json!({"k": [1, 2]})), ArtifactType::Json),
            (
                ArtifactContent::Table {
                    headers: vec!["a".into()],
                    rows: vec![vec!["1".into()]],
                },
                ArtifactType::Dataframe,
            ),
        ];
        for (content, kind) in contents {
            let expected = content.to_bytes().unwrap();
            let a = s.save(NewArtifact::new("x", content, kind, "")).await.unwrap();
            assert_eq!(s.read(&a.id).await.unwrap().as_bytes(), expected.as_slice());
        }
    }

    #[tokio::test]
    async fn identical_saves_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let a = s.save(NewArtifact::new("same", "same", ArtifactType::Text, "")).await.unwrap();
        let b = s.save(NewArtifact::new("same", "same", ArtifactType::Text, "")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("same_"));
        assert_eq!(s.read(&a.id).await.unwrap(), s.read(&b.id).await.unwrap());
    }

    #[tokio::test]
    async fn oversized_content_is_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let s = ArtifactStore::open(
            dir.path().join("artifacts"),
            ArtifactOptions {
                max_artifact_bytes: 4,
                quota_bytes: None,
            },
        )
        .unwrap();
        let err = s
            .save(NewArtifact::new("big", "12345", ArtifactType::Text, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::TooLarge { size: 5, limit: 4 }));
        assert_eq!(s.count().await, 0);
        let files = std::fs::read_dir(s.dir()).unwrap().count();
        assert_eq!(files, 0);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        assert!(matches!(s.read("nope").await, Err(ArtifactError::NotFound(_))));
        assert!(s.get("nope").await.unwrap().is_none());
        assert!(!s.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn find_filters_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let blast = s
            .save(
                NewArtifact::new("blast hits", "x", ArtifactType::Table, "BLAST output")
                    .tags(vec!["homology".into()])
                    .source_tool("blast"),
            )
            .await
            .unwrap();
        s.save(NewArtifact::new("tree", "(a,b);", ArtifactType::Tree, "phylogeny").source_tool("iqtree"))
            .await
            .unwrap();

        let by_query = s
            .find(&ArtifactFilter {
                query: Some("blast".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_query.len(), 1);
        assert_eq!(by_query[0].id, blast.id);

        let by_tag = s
            .find(&ArtifactFilter {
                tags: vec!["homology".into(), "other".into()],
                ..Default::default()
            })
            .await;
        assert_eq!(by_tag.len(), 1);

        let by_tool = s
            .find(&ArtifactFilter {
                source_tool: Some("iqtree".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_tool[0].artifact_type, ArtifactType::Tree);

        // Touching moves an artifact to the front.
        s.get(&blast.id).await.unwrap();
        assert_eq!(s.list(None, 10).await[0].id, blast.id);
        assert_eq!(s.list(Some(ArtifactType::Tree), 10).await.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_file_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let a = s.save(NewArtifact::new("gone", "bye", ArtifactType::Text, "")).await.unwrap();
        assert!(a.file_path.exists());
        assert!(s.delete(&a.id).await.unwrap());
        assert!(!a.file_path.exists());
        assert_eq!(s.count().await, 0);
    }

    #[tokio::test]
    async fn index_survives_reopen_and_corruption_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        {
            let s = store(dir.path());
            s.save(NewArtifact::new("keep", "me", ArtifactType::Code, "")).await.unwrap();
        }
        let s = store(dir.path());
        let stats = s.stats().await;
        assert_eq!(stats.total_artifacts, 1);
        assert_eq!(stats.total_size_bytes, 2);
        assert_eq!(stats.by_type["code"], 1);

        std::fs::write(dir.path().join("artifacts").join(INDEX_FILE), "garbage").unwrap();
        assert_eq!(store(dir.path()).count().await, 0);
    }

    #[test]
    fn human_size_units() {
        assert_eq!(human_size(512), "512.0 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn stats_report_quota_overrun() {
        let stats = ArtifactStats {
            total_artifacts: 1,
            total_size_bytes: 10,
            by_type: BTreeMap::new(),
            quota_bytes: Some(5),
            dir: PathBuf::new(),
        };
        assert!(stats.over_quota());
    }
}
