//! Cross-encoder rerank providers.
//!
//! A reranker rescores (query, passage) pairs. Scores are raw logits; the
//! retriever squashes and blends them with the vector similarity.

pub mod provider;
pub mod providers;

pub use provider::{create_reranker, RerankProvider};
