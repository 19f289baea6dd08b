//! Vector search with rerank and page diversity.

use crate::embeddings::EmbeddingProvider;
use crate::normalize::normalize_text;
use crate::rag::types::{ContextSet, Passage};
use crate::rag::with_deadline;
use crate::rerank::RerankProvider;
use crate::vector_index::{QueryResult, VectorIndex};
use citewise_core::{AppResult, RetrievalConfig};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Passages from one retrieval, plus whether a collaborator failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub passages: ContextSet,
    /// The embedder or index failed or timed out; `passages` is empty
    pub degraded: bool,
}

/// Turns a query into a ranked, page-diverse context set.
///
/// Holds only shared read-only handles; one retriever serves concurrent
/// queries.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankProvider>>,
    config: RetrievalConfig,
    timeout: Duration,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("embedder", &self.embedder)
            .field("reranker", &self.reranker)
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            embedder,
            reranker: None,
            config,
            timeout,
        }
    }

    pub fn with_reranker(mut self, reranker: Option<Arc<dyn RerankProvider>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to K passages for `query`.
    ///
    /// Never fails: an unreachable embedder or index yields an empty set.
    pub async fn retrieve(&self, query: &str) -> ContextSet {
        self.retrieve_detailed(query).await.passages
    }

    /// Like [`retrieve`](Self::retrieve), also reporting whether a
    /// collaborator failed.
    #[instrument(skip(self, query), fields(top_k = self.config.top_k))]
    pub async fn retrieve_detailed(&self, query: &str) -> Retrieval {
        match self.search(query).await {
            Ok(candidates) => Retrieval {
                passages: self.select(self.rank(query, candidates).await),
                degraded: false,
            },
            Err(e) => {
                warn!("Retrieval failed, continuing without passages: {}", e);
                Retrieval {
                    passages: Vec::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Embed the query and fetch the thresholded candidate pool.
    async fn search(&self, query: &str) -> AppResult<Vec<Passage>> {
        let normalized = normalize_text(query);

        let embedding = with_deadline(
            "embedding",
            self.timeout,
            self.embedder.embed(&normalized),
        )
        .await?;

        let n_results = self.config.overfetch();
        let result = with_deadline(
            "vector index",
            self.timeout,
            self.index.query(&embedding, n_results),
        )
        .await?;

        let candidates = to_passages(result);
        debug!("Index returned {} candidates", candidates.len());

        Ok(apply_threshold(candidates, self.config.min_similarity))
    }

    /// Order candidates by final score, reranking the head of the pool.
    async fn rank(&self, query: &str, mut candidates: Vec<Passage>) -> Vec<Passage> {
        // Stable, so ties keep index order
        candidates.sort_by(|a, b| b.vector_score.total_cmp(&a.vector_score));

        let Some(reranker) = &self.reranker else {
            return candidates;
        };
        if candidates.is_empty() {
            return candidates;
        }

        let pool_size = self.config.rerank_pool_size().min(candidates.len());
        let pairs: Vec<(String, String)> = candidates[..pool_size]
            .iter()
            .map(|p| (query.to_string(), p.text.clone()))
            .collect();

        let scores = match with_deadline("rerank", self.timeout, reranker.score_pairs(&pairs)).await
        {
            Ok(scores) if scores.len() == pool_size => scores,
            Ok(scores) => {
                warn!(
                    "Reranker returned {} scores for {} pairs, keeping vector order",
                    scores.len(),
                    pool_size
                );
                return candidates;
            }
            Err(e) => {
                warn!("Rerank failed, keeping vector order: {}", e);
                return candidates;
            }
        };

        blend_scores(candidates, &scores, self.config.rerank.alpha)
    }

    /// Take K passages, one per page first, then fill from the rest.
    fn select(&self, ranked: Vec<Passage>) -> ContextSet {
        let k = self.config.top_k;

        if !self.config.unique_pages {
            return ranked.into_iter().take(k).collect();
        }

        let mut seen_pages = HashSet::new();
        let mut selected = Vec::new();
        let mut leftovers = Vec::new();

        for passage in ranked {
            if selected.len() < k && seen_pages.insert(passage.page) {
                selected.push(passage);
            } else {
                leftovers.push(passage);
            }
        }

        if selected.len() < k {
            debug!(
                "Only {} distinct pages available, relaxing diversity",
                selected.len()
            );
            let missing = k - selected.len();
            selected.extend(leftovers.into_iter().take(missing));
        }

        selected
    }
}

/// Convert index results into passages, skipping entries without a usable page.
fn to_passages(result: QueryResult) -> Vec<Passage> {
    let QueryResult {
        ids,
        texts,
        metadatas,
        distances,
    } = result;

    ids.into_iter()
        .zip(texts)
        .zip(metadatas)
        .zip(distances)
        .filter_map(|(((id, text), metadata), distance)| {
            let Some(page) = page_of(&metadata) else {
                warn!("Skipping candidate '{}' without a page number", id);
                return None;
            };
            let Some(distance) = distance else {
                warn!("Skipping candidate '{}' without a distance", id);
                return None;
            };
            let vector_score = (1.0 - distance).max(0.0);
            Some(Passage {
                id,
                text,
                page,
                vector_score,
                rerank_score: None,
                final_score: vector_score,
            })
        })
        .collect()
}

/// Page number from chunk metadata; accepts numbers and numeric strings.
fn page_of(metadata: &serde_json::Value) -> Option<u32> {
    match metadata.get("page")? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Drop candidates below `min_similarity`, unless that would drop all of them.
fn apply_threshold(candidates: Vec<Passage>, min_similarity: f32) -> Vec<Passage> {
    if min_similarity <= 0.0 {
        return candidates;
    }

    let kept: Vec<Passage> = candidates
        .iter()
        .filter(|p| p.vector_score >= min_similarity)
        .cloned()
        .collect();

    if kept.is_empty() && !candidates.is_empty() {
        debug!(
            "No candidate reached similarity {:.2}, using unfiltered pool",
            min_similarity
        );
        return candidates;
    }
    kept
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Blend rerank scores into the first `scores.len()` candidates and sort
/// them; the remainder follows in its original order.
fn blend_scores(mut candidates: Vec<Passage>, scores: &[f32], alpha: f32) -> Vec<Passage> {
    let rest = candidates.split_off(scores.len());

    for (passage, raw) in candidates.iter_mut().zip(scores) {
        let rerank = sigmoid(*raw);
        passage.rerank_score = Some(rerank);
        passage.final_score = alpha * rerank + (1.0 - alpha) * passage.vector_score;
    }

    candidates.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    candidates.extend(rest);
    candidates
}
