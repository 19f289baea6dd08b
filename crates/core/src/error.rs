//! Error types for citewise.
//!
//! One enum covers every failure category in the workspace. Collaborator
//! failures inside a pipeline run are downgraded at the stage boundary, so
//! most of these variants only reach the user through the CLI commands that
//! manage the index or load configuration.

use thiserror::Error;

/// Unified error type for citewise.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generator (LLM provider) errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector index storage and query errors
    #[error("Index error: {0}")]
    Index(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Cross-encoder rerank errors
    #[error("Rerank error: {0}")]
    Rerank(String),

    /// Prompt definition and rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// The query cannot be answered at all (empty or whitespace-only)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A collaborator call exceeded its stage deadline
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
