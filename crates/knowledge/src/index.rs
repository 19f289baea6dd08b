//! SQLite-backed vector index.
//!
//! Embeddings are stored as little-endian `f32` blobs and scored by brute
//! force cosine distance. This is plenty for a single report of a few
//! thousand chunks.

use crate::types::{CorpusSource, IndexedChunk};
use crate::vector_index::{QueryResult, VectorIndex};
use chrono::{DateTime, Utc};
use citewise_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    imported_at TEXT NOT NULL,
    pages_count INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    page INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL,
    FOREIGN KEY (source_id) REFERENCES sources(id)
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id);
CREATE INDEX IF NOT EXISTS idx_chunks_page ON chunks(page);
"#;

/// Counts reported by [`SqliteIndex::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCounts {
    pub sources: u32,
    pub chunks: u32,
    pub pages: u32,
}

/// Vector index stored in a single SQLite file.
#[derive(Clone)]
pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex").field("path", &self.path).finish()
    }
}

impl SqliteIndex {
    /// Open (creating if needed) the index at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Index(format!("Failed to create index directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Index(format!("Failed to open SQLite index: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Index(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Opened SQLite index at {:?}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: db_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        lock_conn(&self.conn)
    }

    /// Record an imported source.
    pub fn insert_source(&self, source: &CorpusSource) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO sources (id, path, imported_at, pages_count, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                source.id,
                source.path.to_string_lossy().to_string(),
                source.imported_at.to_rfc3339(),
                source.pages_count as i64,
                source.size_bytes as i64,
            ],
        )
        .map_err(|e| AppError::Index(format!("Failed to insert source: {}", e)))?;

        Ok(())
    }

    /// Insert or replace chunks in one transaction.
    pub fn upsert_chunks(&self, chunks: &[IndexedChunk]) -> AppResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO chunks (id, source_id, page, text, embedding, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| AppError::Index(format!("Failed to prepare insert: {}", e)))?;

            for chunk in chunks {
                let metadata_json = serde_json::to_string(&chunk.metadata)?;
                stmt.execute(params![
                    chunk.id,
                    chunk.source_id,
                    chunk.page as i64,
                    chunk.text,
                    embedding_to_bytes(&chunk.embedding),
                    metadata_json,
                ])
                .map_err(|e| AppError::Index(format!("Failed to insert chunk: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("Failed to commit chunks: {}", e)))?;

        Ok(chunks.len())
    }

    /// Source, chunk and distinct page counts.
    pub fn stats(&self) -> AppResult<IndexCounts> {
        let conn = self.lock()?;
        let count = |sql: &str| -> AppResult<u32> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0).map(|v| v as u32))
                .map_err(|e| AppError::Index(format!("Failed to count: {}", e)))
        };

        Ok(IndexCounts {
            sources: count("SELECT COUNT(*) FROM sources")?,
            chunks: count("SELECT COUNT(*) FROM chunks")?,
            pages: count("SELECT COUNT(DISTINCT page) FROM chunks")?,
        })
    }

    /// Timestamp of the most recent import, if any.
    pub fn last_import_at(&self) -> AppResult<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let latest: Option<String> = conn
            .query_row("SELECT MAX(imported_at) FROM sources", [], |row| row.get(0))
            .optional()
            .map_err(|e| AppError::Index(format!("Failed to read sources: {}", e)))?
            .flatten();

        Ok(latest
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc)))
    }

    /// Delete all chunks and sources.
    pub fn reset(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM sources;")
            .map_err(|e| AppError::Index(format!("Failed to reset index: {}", e)))?;

        tracing::info!("Reset index at {:?}", self.path);
        Ok(())
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> AppResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| AppError::Index("Index connection lock poisoned".to_string()))
}

/// Score every stored chunk against `query_embedding` and keep the nearest.
fn query_nearest(conn: &Connection, query_embedding: &[f32], n_results: usize) -> AppResult<QueryResult> {
    let mut stmt = conn
        .prepare("SELECT id, text, embedding, metadata FROM chunks")
        .map_err(|e| AppError::Index(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| AppError::Index(format!("Failed to query chunks: {}", e)))?;

    let mut scored = Vec::new();
    for row in rows {
        let (id, text, blob, metadata_json) =
            row.map_err(|e| AppError::Index(format!("Failed to read chunk: {}", e)))?;

        let distance = match bytes_to_embedding(&blob) {
            Some(embedding) if embedding.len() == query_embedding.len() => {
                Some(1.0 - cosine_similarity(query_embedding, &embedding))
            }
            _ => {
                tracing::warn!(chunk = %id, "Stored embedding unusable for this query");
                None
            }
        };

        let metadata = serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null);
        scored.push((id, text, metadata, distance));
    }

    // Nearest first; unknown distances last
    scored.sort_by(|a, b| match (a.3, b.3) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    scored.truncate(n_results);

    let mut result = QueryResult::default();
    for (id, text, metadata, distance) in scored {
        result.push(id, text, metadata, distance);
    }

    tracing::debug!("Retrieved {} chunks (requested {})", result.len(), n_results);
    Ok(result)
}

#[async_trait::async_trait]
impl VectorIndex for SqliteIndex {
    async fn query(&self, embedding: &[f32], n_results: usize) -> AppResult<QueryResult> {
        let conn = Arc::clone(&self.conn);
        let embedding = embedding.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            query_nearest(&conn, &embedding, n_results)
        })
        .await
        .map_err(|e| AppError::Index(format!("Index query task failed: {}", e)))?
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.stats()?.chunks as usize)
    }
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }

    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
