//! Offline lexical reranker.
//!
//! Scores a pair by the fraction of the query's content words that appear
//! in the passage, mapped onto a logit in [-4, 4] so it squashes the same
//! way a cross-encoder score does.

use crate::normalize::content_words;
use crate::rerank::RerankProvider;
use async_trait::async_trait;
use citewise_core::AppResult;
use std::collections::HashSet;

const LOGIT_SPAN: f32 = 8.0;

#[derive(Debug, Clone, Default)]
pub struct LexicalReranker;

impl LexicalReranker {
    pub fn new() -> Self {
        Self
    }

    fn score(query: &str, passage: &str) -> f32 {
        let query_words: HashSet<String> = content_words(query).into_iter().collect();
        if query_words.is_empty() {
            return -LOGIT_SPAN / 2.0;
        }

        let passage_words: HashSet<String> = content_words(passage).into_iter().collect();
        let hits = query_words
            .iter()
            .filter(|w| passage_words.contains(*w))
            .count();

        let overlap = hits as f32 / query_words.len() as f32;
        overlap * LOGIT_SPAN - LOGIT_SPAN / 2.0
    }
}

#[async_trait]
impl RerankProvider for LexicalReranker {
    fn provider_name(&self) -> &str {
        "lexical"
    }

    async fn score_pairs(&self, pairs: &[(String, String)]) -> AppResult<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(query, passage)| Self::score(query, passage))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(q: &str, p: &str) -> (String, String) {
        (q.to_string(), p.to_string())
    }

    #[tokio::test]
    async fn test_scores_follow_overlap() {
        let reranker = LexicalReranker::new();
        let scores = reranker
            .score_pairs(&[
                pair("glacier retreat", "Glacier retreat accelerated after 2000."),
                pair("glacier retreat", "Glaciers are retreating in the Alps."),
                pair("glacier retreat", "Crop yields depend on rainfall."),
            ])
            .await
            .unwrap();

        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0], 4.0);
        assert!(scores[1] < scores[0]);
        assert_eq!(scores[2], -4.0);
    }

    #[tokio::test]
    async fn test_stopword_only_query_scores_minimum() {
        let reranker = LexicalReranker::new();
        let scores = reranker
            .score_pairs(&[pair("what is the", "The report is long.")])
            .await
            .unwrap();
        assert_eq!(scores, vec![-4.0]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let scores = LexicalReranker::new().score_pairs(&[]).await.unwrap();
        assert!(scores.is_empty());
    }
}
