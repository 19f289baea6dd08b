//! Rerank provider trait and factory.

use citewise_core::{AppError, AppResult, RerankConfig};
use std::sync::Arc;

/// Trait for rerank providers.
#[async_trait::async_trait]
pub trait RerankProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "lexical", "http")
    fn provider_name(&self) -> &str;

    /// Score each `(query, passage)` pair.
    ///
    /// Returns one raw score per pair, in input order.
    async fn score_pairs(&self, pairs: &[(String, String)]) -> AppResult<Vec<f32>>;
}

/// Create the reranker described by `config`.
///
/// Returns `Ok(None)` when rerank is disabled.
pub fn create_reranker(config: &RerankConfig) -> AppResult<Option<Arc<dyn RerankProvider>>> {
    if !config.enabled {
        tracing::debug!("Rerank disabled");
        return Ok(None);
    }

    tracing::debug!(
        "Creating reranker: provider={}, model={}",
        config.provider,
        config.model
    );

    match config.provider.as_str() {
        "lexical" => Ok(Some(Arc::new(super::providers::LexicalReranker::new()))),

        "http" => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                AppError::Config("Rerank provider 'http' requires retrieval.rerank.endpoint".to_string())
            })?;
            let reranker = super::providers::HttpReranker::new(endpoint, &config.model)?;
            Ok(Some(Arc::new(reranker)))
        }

        _ => Err(AppError::Config(format!(
            "Unknown rerank provider: '{}'. Supported providers: lexical, http",
            config.provider
        ))),
    }
}
