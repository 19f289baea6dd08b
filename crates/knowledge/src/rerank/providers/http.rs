//! Cross-encoder rerank over HTTP.
//!
//! Talks to a text-embeddings-inference style server:
//! `POST {endpoint}/rerank` with `{query, texts, raw_scores: true}`,
//! answered by `[{index, score}]` in any order.

use crate::rerank::RerankProvider;
use async_trait::async_trait;
use citewise_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const RERANK_ENDPOINT: &str = "/rerank";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct HttpReranker {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: Vec<&'a str>,
    raw_scores: bool,
}

#[derive(Debug, Deserialize)]
struct RankedText {
    index: usize,
    score: f32,
}

impl HttpReranker {
    pub fn new(endpoint: &str, model: &str) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Rerank(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    async fn rerank_group(&self, query: &str, texts: Vec<&str>) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, RERANK_ENDPOINT);
        let expected = texts.len();

        let response = self
            .client
            .post(&url)
            .json(&RerankRequest {
                query,
                texts,
                raw_scores: true,
            })
            .send()
            .await
            .map_err(|e| AppError::Rerank(format!("Failed to send rerank request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Rerank(format!(
                "Rerank server error ({}): {}",
                status, body
            )));
        }

        let ranked: Vec<RankedText> = response
            .json()
            .await
            .map_err(|e| AppError::Rerank(format!("Failed to parse rerank response: {}", e)))?;

        scores_in_input_order(ranked, expected)
    }
}

/// Put `[{index, score}]` back into input order, requiring one score per text.
fn scores_in_input_order(ranked: Vec<RankedText>, expected: usize) -> AppResult<Vec<f32>> {
    let mut scores = vec![None; expected];
    for item in ranked {
        let slot = scores.get_mut(item.index).ok_or_else(|| {
            AppError::Rerank(format!(
                "Rerank response index {} out of range for {} texts",
                item.index, expected
            ))
        })?;
        *slot = Some(item.score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            s.ok_or_else(|| AppError::Rerank(format!("Rerank response is missing text {}", i)))
        })
        .collect()
}

#[async_trait]
impl RerankProvider for HttpReranker {
    fn provider_name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, pairs), fields(pairs = pairs.len(), model = %self.model))]
    async fn score_pairs(&self, pairs: &[(String, String)]) -> AppResult<Vec<f32>> {
        let mut scores = Vec::with_capacity(pairs.len());

        // The server takes one query per request; group consecutive pairs
        // that share it.
        let mut start = 0;
        while start < pairs.len() {
            let query = &pairs[start].0;
            let end = pairs[start..]
                .iter()
                .position(|(q, _)| q != query)
                .map_or(pairs.len(), |offset| start + offset);

            let texts = pairs[start..end].iter().map(|(_, t)| t.as_str()).collect();
            debug!("Reranking {} texts", end - start);
            scores.extend(self.rerank_group(query, texts).await?);
            start = end;
        }

        Ok(scores)
    }
}
