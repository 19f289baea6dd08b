//! Corpus and index type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one corpus (one vector index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Name of the corpus
    pub name: String,

    /// Embedding provider: "trigram" or "ollama"
    pub provider: String,

    /// Embedding model
    pub model: String,

    /// Embedding endpoint for HTTP providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Embedding vector dimension
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks of a page, in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Texts per embedding request during import
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_dim() -> usize {
    384
}

fn default_chunk_size() -> usize {
    1200
}

fn default_chunk_overlap() -> usize {
    150
}

fn default_batch_size() -> usize {
    32
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            endpoint: None,
            embedding_dim: default_embedding_dim(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
        }
    }
}

/// One imported file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSource {
    /// Unique source identifier
    pub id: String,

    /// Path the pages were read from
    pub path: PathBuf,

    /// When this source was imported
    pub imported_at: DateTime<Utc>,

    /// Number of page records read
    pub pages_count: u32,

    /// Source size in bytes
    pub size_bytes: u64,
}

/// A chunk of page text with its embedding, as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Deterministic chunk identifier
    pub id: String,

    /// Source the chunk was imported from
    pub source_id: String,

    /// Page the text comes from
    pub page: u32,

    /// Normalized chunk text
    pub text: String,

    /// Embedding vector
    pub embedding: Vec<f32>,

    /// Metadata stored alongside (always carries `page`)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One line of an import file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page: u32,
    pub text: String,
    #[serde(default)]
    pub section: Option<String>,
}

/// Options for the import operation.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Corpus name
    pub corpus: String,

    /// Files or directories of `*.jsonl` page records
    pub paths: Vec<PathBuf>,

    /// Clear the index before importing
    pub reset: bool,
}

/// Statistics from an import operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportStats {
    pub sources_count: u32,
    pub pages_count: u32,
    pub chunks_count: u32,
    /// Lines that were not valid page records
    pub skipped_lines: u32,
    pub duration_secs: f64,
}

/// Statistics for a corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusStats {
    pub corpus: String,
    pub sources_count: u32,
    pub chunks_count: u32,
    /// Distinct pages with at least one chunk
    pub pages_count: u32,
    pub db_size_bytes: u64,
    pub last_import_at: Option<DateTime<Utc>>,
}
