//! SQLite similarity backend.
//!
//! Uses a single database file `similarity.db` with two tables:
//! - `similarity_records` — content, metadata, and the embedding blob per row
//! - `similarity_meta` — embedding model name and dimension
//!
//! A record and its vector live in the same row, so one insert is atomic.
//! Scoring is an exact cosine scan over the stored blobs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use mnemos_core::error::MemoryError;
use mnemos_core::{Metadata, SimilarityHit, SimilarityRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{IndexMeta, SimilarityBackend};
use crate::vector;

const DB_FILE: &str = "similarity.db";

/// A SQLite-backed similarity index.
pub struct SqliteIndex {
    pool: SqlitePool,
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SqliteIndex {
    /// Open (or create) `similarity.db` inside `dir`.
    pub async fn open(dir: &Path) -> Result<Self, MemoryError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| MemoryError::Storage(format!("Cannot create {}: {e}", dir.display())))?;

        let options = SqliteConnectOptions::new()
            .filename(dir.join(DB_FILE))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let index = Self {
            pool,
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        };
        index.run_migrations().await?;
        info!(path = %dir.display(), "SQLite similarity index initialized");
        Ok(index)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS similarity_records (
                id            TEXT PRIMARY KEY NOT NULL,
                content       TEXT NOT NULL,
                source_label  TEXT NOT NULL,
                metadata      TEXT NOT NULL DEFAULT '{}',
                created_at    TEXT NOT NULL,
                embedding     BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("records table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_similarity_created_at ON similarity_records(created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("created_at index: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS similarity_meta (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("meta table: {e}")))?;

        debug!("SQLite similarity migrations complete");
        Ok(())
    }

    /// Parse a record from a row. The embedding column is read separately.
    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<SimilarityRecord, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let source_label: String = row
            .try_get("source_label")
            .map_err(|e| MemoryError::QueryFailed(format!("source_label column: {e}")))?;
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| MemoryError::QueryFailed(format!("metadata column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

        let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(SimilarityRecord {
            id,
            content,
            source_label,
            metadata,
            created_at,
        })
    }

    async fn read_meta<'e, E>(executor: E) -> Result<Option<IndexMeta>, MemoryError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let rows = sqlx::query("SELECT key, value FROM similarity_meta")
            .fetch_all(executor)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("meta read: {e}")))?;

        let mut model = None;
        let mut dimension = None;
        for row in &rows {
            let key: String = row.try_get("key").unwrap_or_default();
            let value: String = row.try_get("value").unwrap_or_default();
            match key.as_str() {
                "model" => model = Some(value),
                "dimension" => dimension = value.parse().ok(),
                _ => {}
            }
        }

        Ok(model.zip(dimension).map(|(model, dimension)| IndexMeta { model, dimension }))
    }
}

#[async_trait]
impl SimilarityBackend for SqliteIndex {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn location(&self) -> &Path {
        &self.dir
    }

    async fn meta(&self) -> Result<Option<IndexMeta>, MemoryError> {
        Self::read_meta(&self.pool).await
    }

    async fn insert(
        &self,
        record: &SimilarityRecord,
        embedding: &[f32],
        meta: &IndexMeta,
    ) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        match Self::read_meta(&mut *tx).await? {
            Some(existing) if existing.dimension != embedding.len() => {
                return Err(MemoryError::DimensionMismatch {
                    expected: existing.dimension,
                    actual: embedding.len(),
                });
            }
            Some(_) => {}
            None => {
                sqlx::query("INSERT OR REPLACE INTO similarity_meta (key, value) VALUES ('model', ?1), ('dimension', ?2)")
                    .bind(&meta.model)
                    .bind(meta.dimension.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| MemoryError::Storage(format!("meta write: {e}")))?;
            }
        }

        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| MemoryError::Storage(format!("Metadata serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO similarity_records (id, content, source_label, metadata, created_at, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.id)
        .bind(&record.content)
        .bind(&record.source_label)
        .bind(&metadata_json)
        .bind(record.created_at.to_rfc3339())
        .bind(vector::embedding_to_blob(embedding))
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(id = %record.id, "Stored similarity record");
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        max_results: usize,
        source_filter: Option<&str>,
        min_similarity: f64,
    ) -> Result<Vec<SimilarityHit>, MemoryError> {
        if let Some(meta) = self.meta().await?
            && meta.dimension != query.len()
        {
            return Err(MemoryError::DimensionMismatch {
                expected: meta.dimension,
                actual: query.len(),
            });
        }

        let rows = sqlx::query("SELECT * FROM similarity_records")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Vector scan: {e}")))?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = Self::row_to_record(row)?;
            let blob: Vec<u8> = row
                .try_get("embedding")
                .map_err(|e| MemoryError::QueryFailed(format!("embedding column: {e}")))?;
            candidates.push((record, vector::blob_to_embedding(&blob)));
        }

        Ok(vector::rank(
            candidates.iter().map(|(r, v)| (r, v.as_slice())),
            query,
            min_similarity,
            source_filter,
            max_results,
        ))
    }

    async fn recent(
        &self,
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SimilarityRecord>, MemoryError> {
        let rows = match source_filter {
            Some(source) => {
                sqlx::query(
                    "SELECT * FROM similarity_records WHERE source_label = ?1 ORDER BY created_at DESC LIMIT ?2",
                )
                .bind(source)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM similarity_records ORDER BY created_at DESC LIMIT ?1")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| MemoryError::QueryFailed(format!("Recent: {e}")))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM similarity_records WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM similarity_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| MemoryError::QueryFailed(format!("count column: {e}")))?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;
        sqlx::query("DELETE FROM similarity_records")
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("Clear records: {e}")))?;
        sqlx::query("DELETE FROM similarity_meta")
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("Clear meta: {e}")))?;
        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, source: &str) -> SimilarityRecord {
        SimilarityRecord {
            id: id.into(),
            content: format!("content {id}"),
            source_label: source.into(),
            metadata: Default::default(),
            created_at: Utc::now(),
        }
    }

    fn meta(dim: usize) -> IndexMeta {
        IndexMeta {
            model: "m".into(),
            dimension: dim,
        }
    }

    #[tokio::test]
    async fn insert_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(dir.path()).await.unwrap();
        index.insert(&record("a", "x"), &[1.0, 0.0], &meta(2)).await.unwrap();
        index.insert(&record("b", "y"), &[0.0, 1.0], &meta(2)).await.unwrap();

        let hits = index.search(&[1.0, 0.1], 5, None, 0.5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "a");

        let hits = index.search(&[1.0, 1.0], 5, Some("y"), 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "b");
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = SqliteIndex::open(dir.path()).await.unwrap();
            index.insert(&record("a", "x"), &[1.0, 0.0], &meta(2)).await.unwrap();
        }
        let index = SqliteIndex::open(dir.path()).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.meta().await.unwrap(), Some(meta(2)));
    }

    #[tokio::test]
    async fn dimension_mismatch_rejected_inside_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(dir.path()).await.unwrap();
        index.insert(&record("a", "x"), &[1.0, 0.0], &meta(2)).await.unwrap();
        let err = index
            .insert(&record("b", "x"), &[1.0, 0.0, 0.0], &meta(3))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_recent_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(dir.path()).await.unwrap();
        index.insert(&record("a", "x"), &[1.0], &meta(1)).await.unwrap();
        index.insert(&record("b", "y"), &[1.0], &meta(1)).await.unwrap();

        let recent = index.recent(10, Some("y")).await.unwrap();
        assert_eq!(recent.len(), 1);

        assert!(index.delete("a").await.unwrap());
        assert!(!index.delete("a").await.unwrap());

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.meta().await.unwrap().is_none());
    }
}
