//! Index command handler.
//!
//! Manages the corpus vector index: import, clean and stats.

use anyhow::Context;
use clap::{Args, Subcommand};
use citewise_core::config::AppConfig;
use citewise_knowledge::ImportOptions;
use std::path::PathBuf;

/// Corpus index management
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Import JSON-lines page records
    Import(IndexImportCommand),
    /// Remove everything from the corpus index
    Clean,
    /// Show corpus statistics
    Stats(IndexStatsCommand),
}

/// Import page records
#[derive(Args, Debug)]
pub struct IndexImportCommand {
    /// Files or directories of `*.jsonl` page records
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Reset the corpus before importing
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexImportCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing index import for corpus '{}'", config.corpus);

        let options = ImportOptions {
            corpus: config.corpus.clone(),
            paths: self.paths.clone(),
            reset: self.reset,
        };

        let stats = citewise_knowledge::import(&config.workspace, options)
            .await
            .with_context(|| format!("Import into corpus '{}' failed", config.corpus))?;

        if self.json {
            let output = serde_json::json!({
                "corpus": config.corpus,
                "sourcesCount": stats.sources_count,
                "pagesCount": stats.pages_count,
                "chunksCount": stats.chunks_count,
                "skippedLines": stats.skipped_lines,
                "durationSecs": stats.duration_secs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Imported {} sources ({} pages, {} chunks) in {:.2}s",
                stats.sources_count, stats.pages_count, stats.chunks_count, stats.duration_secs
            );
            if stats.skipped_lines > 0 {
                println!("Skipped {} invalid lines", stats.skipped_lines);
            }
        }

        Ok(())
    }
}

/// Show corpus stats
#[derive(Args, Debug)]
pub struct IndexStatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexStatsCommand {
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing index stats for corpus '{}'", config.corpus);

        let stats = citewise_knowledge::stats(&config.workspace, &config.corpus)?;

        if self.json {
            let output = serde_json::json!({
                "corpus": stats.corpus,
                "sourcesCount": stats.sources_count,
                "chunksCount": stats.chunks_count,
                "pagesCount": stats.pages_count,
                "dbSizeBytes": stats.db_size_bytes,
                "lastImportAt": stats.last_import_at,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Corpus: {}", stats.corpus);
            println!("  Sources: {}", stats.sources_count);
            println!("  Pages: {}", stats.pages_count);
            println!("  Chunks: {}", stats.chunks_count);
            println!("  DB size: {} bytes", stats.db_size_bytes);
            if let Some(last_import) = stats.last_import_at {
                println!("  Last import: {}", last_import);
            }
        }

        Ok(())
    }
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        match &self.action {
            IndexAction::Import(cmd) => cmd.execute(config).await,
            IndexAction::Clean => {
                citewise_knowledge::clean(&config.workspace, &config.corpus)?;
                println!("Corpus '{}' cleaned", config.corpus);
                Ok(())
            }
            IndexAction::Stats(cmd) => cmd.execute(config),
        }
    }
}
