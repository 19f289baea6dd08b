//! Collaborator fakes with call counters.

use crate::embeddings::EmbeddingProvider;
use crate::rag::{Generator, Moderator, Pipeline, PipelineContext, Retriever, Verdict};
use crate::vector_index::{QueryResult, VectorIndex};
use citewise_core::{AppError, AppResult, RerankConfig, RetrievalConfig};
use citewise_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use citewise_prompt::{load_prompt, PromptRenderer, ANSWER_PROMPT_ID};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Index with fixed rows; counts queries.
#[derive(Default)]
pub struct FakeIndex {
    rows: Vec<(u32, String, f32)>,
    fail: bool,
    pub queries: AtomicUsize,
}

impl FakeIndex {
    /// Rows of `(page, text, distance)`.
    pub fn with_rows(rows: &[(u32, &str, f32)]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(page, text, d)| (*page, text.to_string(), *d))
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VectorIndex for FakeIndex {
    async fn query(&self, _embedding: &[f32], n_results: usize) -> AppResult<QueryResult> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Index("database is locked".to_string()));
        }

        let mut result = QueryResult::default();
        for (i, (page, text, d)) in self.rows.iter().take(n_results).enumerate() {
            result.push(
                format!("chunk-{}", i),
                text.clone(),
                serde_json::json!({ "page": page }),
                Some(*d),
            );
        }
        Ok(result)
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.rows.len())
    }
}

/// Embeds everything to the same unit vector.
#[derive(Debug)]
pub struct ConstantEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for ConstantEmbedder {
    fn provider_name(&self) -> &str {
        "constant"
    }

    fn model_name(&self) -> &str {
        "constant"
    }

    fn dimensions(&self) -> usize {
        4
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
    }
}

/// Replies with the scripted answers in order, repeating the last one.
pub struct ScriptedLlm {
    replies: Vec<String>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never answers within a short deadline.
    pub fn hanging() -> Self {
        Self {
            delay: Some(Duration::from_secs(10)),
            ..Self::new(&["too late [p.1]"])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();

        Ok(LlmResponse {
            content: reply,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

/// Returns a fixed verdict, or fails.
#[derive(Debug)]
pub struct FixedModerator {
    verdict: Option<Verdict>,
    pub calls: AtomicUsize,
}

impl FixedModerator {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict: Some(verdict),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            verdict: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Moderator for FixedModerator {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn classify(&self, _query: &str) -> AppResult<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict
            .ok_or_else(|| AppError::Llm("classifier offline".to_string()))
    }
}

pub fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        top_k: 4,
        min_similarity: 0.0,
        unique_pages: true,
        rerank: RerankConfig {
            enabled: false,
            ..Default::default()
        },
    }
}

/// Assemble a pipeline around the given fakes.
pub fn pipeline(
    index: Arc<FakeIndex>,
    llm: Arc<ScriptedLlm>,
    moderator: Arc<FixedModerator>,
    timeout: Duration,
) -> Pipeline {
    let temp = tempfile::TempDir::new().unwrap();
    let prompt = PromptRenderer::new(load_prompt(temp.path(), ANSWER_PROMPT_ID).unwrap()).unwrap();

    Pipeline::new(PipelineContext {
        retriever: Retriever::new(index, Arc::new(ConstantEmbedder), retrieval_config(), timeout),
        generator: Generator::new(llm, "scripted-model", 0.0, prompt, timeout),
        moderator,
        timeout,
    })
}
