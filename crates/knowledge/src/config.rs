//! Corpus configuration and on-disk layout.
//!
//! Each corpus lives in `.citewise/corpus/<name>/` with a `config.yaml`
//! and the `index.sqlite` vector index.

use crate::types::CorpusConfig;
use citewise_core::config::STATE_DIR;
use citewise_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Load corpus configuration.
///
/// Falls back to defaults (trigram embeddings) when the corpus has no
/// config file yet.
pub fn load_config(workspace: &Path, corpus: &str) -> AppResult<CorpusConfig> {
    let config_path = get_config_path(workspace, corpus);

    if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let mut config: CorpusConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        config.name = corpus.to_string();
        validate_config(&config)?;

        tracing::debug!("Loaded corpus config for '{}'", corpus);
        Ok(config)
    } else {
        tracing::debug!(
            "Using default corpus config for '{}' (no config file found)",
            corpus
        );
        Ok(CorpusConfig {
            name: corpus.to_string(),
            ..Default::default()
        })
    }
}

/// Save corpus configuration.
pub fn save_config(workspace: &Path, config: &CorpusConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace, &config.name);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let yaml = serde_yaml::to_string(config)?;
    fs::write(&config_path, yaml)?;

    tracing::debug!("Saved corpus config for '{}'", config.name);
    Ok(())
}

fn validate_config(config: &CorpusConfig) -> AppResult<()> {
    if config.chunk_size == 0 || config.embedding_dim == 0 || config.batch_size == 0 {
        return Err(AppError::Config(format!(
            "Corpus '{}': chunk_size, embedding_dim and batch_size must be positive",
            config.name
        )));
    }
    if config.chunk_overlap >= config.chunk_size {
        return Err(AppError::Config(format!(
            "Corpus '{}': chunk_overlap ({}) must be smaller than chunk_size ({})",
            config.name, config.chunk_overlap, config.chunk_size
        )));
    }
    Ok(())
}

/// Get the directory of a corpus.
pub fn get_corpus_dir(workspace: &Path, corpus: &str) -> PathBuf {
    workspace.join(STATE_DIR).join("corpus").join(corpus)
}

/// Get the path to a corpus config file.
pub fn get_config_path(workspace: &Path, corpus: &str) -> PathBuf {
    get_corpus_dir(workspace, corpus).join("config.yaml")
}

/// Get the SQLite index path for a corpus.
pub fn get_index_path(workspace: &Path, corpus: &str) -> PathBuf {
    get_corpus_dir(workspace, corpus).join("index.sqlite")
}
