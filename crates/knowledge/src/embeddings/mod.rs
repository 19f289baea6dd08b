//! Embedding providers.
//!
//! One provider is created per corpus from its [`CorpusConfig`](crate::types::CorpusConfig)
//! and shared by import and the retriever.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
