//! Corpus index and grounded answering.
//!
//! Page records are imported into a local SQLite vector index; the
//! [`rag::Pipeline`] answers questions from it with page citations.

pub mod config;
pub mod embeddings;
pub mod index;
pub mod normalize;
pub mod rag;
pub mod rerank;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use index::SqliteIndex;
pub use rag::{Passage, Pipeline, PipelineOutput, REFUSAL};
pub use types::{
    CorpusConfig, CorpusSource, CorpusStats, ImportOptions, ImportStats, IndexedChunk, PageRecord,
};
pub use vector_index::{QueryResult, VectorIndex};

use chrono::Utc;
use citewise_core::{AppConfig, AppError, AppResult};
use citewise_llm::create_client;
use citewise_prompt::{load_prompt, PromptRenderer, ANSWER_PROMPT_ID};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use text_splitter::{ChunkConfig, TextSplitter};
use walkdir::WalkDir;

/// Build the answer pipeline for the configured corpus.
///
/// Everything expensive (index handle, embedding model, generator client,
/// compiled prompts) is created here once and shared by every invocation.
pub async fn build_pipeline(config: &AppConfig) -> AppResult<Pipeline> {
    let workspace = config.workspace.as_path();
    let corpus = config::load_config(workspace, &config.corpus)?;

    let index_path = config::get_index_path(workspace, &config.corpus);
    if !index_path.exists() {
        tracing::warn!(
            "Corpus '{}' has no index yet. Run 'citewise index import' first.",
            config.corpus
        );
    }
    let index = SqliteIndex::open(&index_path)?;

    let embedder = embeddings::create_provider(&corpus).await?;

    let reranker = match rerank::create_reranker(&config.retrieval.rerank) {
        Ok(reranker) => reranker,
        Err(e) => {
            tracing::warn!("Rerank unavailable, using vector order: {}", e);
            None
        }
    };

    let timeout = config.stage_timeout();
    let retriever = rag::Retriever::new(
        Arc::new(index),
        embedder,
        config.retrieval.clone(),
        timeout,
    )
    .with_reranker(reranker);

    let client = create_client(&config.provider, config.endpoint.as_deref())?;
    let prompt = PromptRenderer::new(load_prompt(workspace, ANSWER_PROMPT_ID)?)?;
    let generator = rag::Generator::new(
        client.clone(),
        config.model.clone(),
        config.temperature,
        prompt,
        timeout,
    );

    let moderator =
        rag::create_moderator(&config.moderation, workspace, client, &config.model)?;

    tracing::info!(
        corpus = %config.corpus,
        generator = %config.provider,
        model = %config.model,
        moderator = moderator.name(),
        "Pipeline ready"
    );

    Ok(Pipeline::new(rag::PipelineContext {
        retriever,
        generator,
        moderator,
        timeout,
    }))
}

/// Import page records into a corpus index.
pub async fn import(workspace: &Path, options: ImportOptions) -> AppResult<ImportStats> {
    let start = Instant::now();

    tracing::info!("Starting import into corpus '{}'", options.corpus);

    let config = config::load_config(workspace, &options.corpus)?;
    let index = SqliteIndex::open(&config::get_index_path(workspace, &options.corpus))?;

    if options.reset {
        tracing::info!("Resetting corpus '{}'", options.corpus);
        index.reset()?;
    }

    let embedder = embeddings::create_provider(&config).await?;
    let chunk_config = ChunkConfig::new(config.chunk_size)
        .with_overlap(config.chunk_overlap)
        .map_err(|e| AppError::Config(format!("Invalid chunking settings: {}", e)))?;
    let splitter = TextSplitter::new(chunk_config);

    let mut stats = ImportStats::default();

    for file in collect_files(&options.paths)? {
        let content = std::fs::read_to_string(&file)?;
        let (records, skipped) = parse_page_records(&content);
        if skipped > 0 {
            tracing::warn!("{:?}: skipped {} invalid lines", file, skipped);
        }
        stats.skipped_lines += skipped;

        let source = CorpusSource {
            id: uuid::Uuid::new_v4().to_string(),
            path: file.clone(),
            imported_at: Utc::now(),
            pages_count: records.len() as u32,
            size_bytes: content.len() as u64,
        };
        index.insert_source(&source)?;

        let mut pieces = Vec::new();
        for record in &records {
            let text = normalize::normalize_text(&record.text);
            for piece in splitter.chunks(&text) {
                pieces.push((record, piece.to_string()));
            }
        }

        for batch in pieces.chunks(config.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let embeddings = embedder.embed_batch(&texts).await?;
            if embeddings.len() != texts.len() {
                return Err(AppError::Embedding(format!(
                    "Provider returned {} embeddings for {} texts",
                    embeddings.len(),
                    texts.len()
                )));
            }

            let chunks: Vec<IndexedChunk> = batch
                .iter()
                .zip(embeddings)
                .map(|((record, text), embedding)| IndexedChunk {
                    id: chunk_id(record.page, text),
                    source_id: source.id.clone(),
                    page: record.page,
                    text: text.clone(),
                    embedding,
                    metadata: serde_json::json!({
                        "page": record.page,
                        "section": record.section,
                    }),
                })
                .collect();

            stats.chunks_count += index.upsert_chunks(&chunks)? as u32;
        }

        tracing::debug!(
            "Imported {:?}: {} pages, {} chunks",
            file,
            records.len(),
            pieces.len()
        );

        stats.sources_count += 1;
        stats.pages_count += records.len() as u32;
    }

    config::save_config(workspace, &config)?;

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Import completed: {} sources, {} pages, {} chunks in {:.2}s",
        stats.sources_count,
        stats.pages_count,
        stats.chunks_count,
        stats.duration_secs
    );

    Ok(stats)
}

/// Expand import paths: files as given, directories walked for `*.jsonl`.
fn collect_files(paths: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if entry_path.is_file()
                    && entry_path.extension().is_some_and(|ext| ext == "jsonl")
                {
                    files.push(entry_path.to_path_buf());
                }
            }
        } else {
            return Err(AppError::Other(format!(
                "Import path does not exist: {:?}",
                path
            )));
        }
    }

    Ok(files)
}

/// Parse JSON-lines page records. Returns the records and the number of
/// non-blank lines that were not valid records.
fn parse_page_records(content: &str) -> (Vec<PageRecord>, u32) {
    let mut records = Vec::new();
    let mut skipped = 0;

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<PageRecord>(line) {
            Ok(record) if !record.text.trim().is_empty() => records.push(record),
            Ok(_) => skipped += 1,
            Err(e) => {
                tracing::debug!("Line {}: not a page record: {}", line_no + 1, e);
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

/// Deterministic chunk id, so re-importing a file replaces its chunks.
fn chunk_id(page: u32, text: &str) -> String {
    format!("{:x}", Sha256::digest(format!("{}:{}", page, text)))
}

/// Remove every chunk and source from a corpus.
pub fn clean(workspace: &Path, corpus: &str) -> AppResult<()> {
    tracing::info!("Cleaning corpus '{}'", corpus);

    let index_path = config::get_index_path(workspace, corpus);
    if !index_path.exists() {
        return Err(AppError::Index(format!("Corpus '{}' does not exist", corpus)));
    }

    SqliteIndex::open(&index_path)?.reset()?;

    tracing::info!("Corpus '{}' cleaned", corpus);
    Ok(())
}

/// Get statistics for a corpus.
pub fn stats(workspace: &Path, corpus: &str) -> AppResult<CorpusStats> {
    let index_path = config::get_index_path(workspace, corpus);
    if !index_path.exists() {
        return Err(AppError::Index(format!("Corpus '{}' does not exist", corpus)));
    }

    let index = SqliteIndex::open(&index_path)?;
    let counts = index.stats()?;
    let db_size_bytes = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    Ok(CorpusStats {
        corpus: corpus.to_string(),
        sources_count: counts.sources,
        chunks_count: counts.chunks,
        pages_count: counts.pages,
        db_size_bytes,
        last_import_at: index.last_import_at()?,
    })
}
