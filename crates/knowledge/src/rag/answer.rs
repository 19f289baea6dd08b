//! Generator invocation: prompt assembly and citation normalization.

use crate::rag::citation::{normalize_citations, REFUSAL};
use crate::rag::types::{DraftAnswer, Passage};
use crate::rag::with_deadline;
use citewise_core::AppResult;
use citewise_llm::{LlmClient, LlmRequest};
use citewise_prompt::PromptRenderer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Longest excerpt text shown to the generator, in characters.
const MAX_EXCERPT_CHARS: usize = 700;

/// Upper bound on generated tokens per answer.
const MAX_ANSWER_TOKENS: u32 = 512;

const NO_EXCERPTS: &str = "(no retrieved excerpts)";

/// One generator call's result.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub draft: DraftAnswer,
    /// The generator failed or timed out; `draft` is the refusal
    pub degraded: bool,
}

impl Generation {
    fn refusal(degraded: bool) -> Self {
        Self {
            draft: DraftAnswer::new(REFUSAL),
            degraded,
        }
    }
}

/// Wraps the generator capability with the grounded-answer prompt.
#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    prompt: Arc<PromptRenderer>,
    timeout: Duration,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .field("prompt", &self.prompt)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Generator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        temperature: f32,
        prompt: PromptRenderer,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            prompt: Arc::new(prompt),
            timeout,
        }
    }

    /// Answer `query` from `contexts`.
    ///
    /// An empty context set short-circuits to the refusal without calling
    /// the generator. Generator failures also yield the refusal, flagged as
    /// degraded.
    #[instrument(skip(self, query, contexts), fields(contexts = contexts.len(), model = %self.model))]
    pub async fn generate(&self, query: &str, contexts: &[Passage]) -> Generation {
        if contexts.is_empty() {
            debug!("No passages retrieved, answering with the refusal");
            return Generation::refusal(false);
        }

        match self.complete(query, contexts).await {
            Ok(text) => {
                let normalized = normalize_citations(text.trim());
                debug!("Generated {} chars", normalized.len());
                Generation {
                    draft: DraftAnswer::new(normalized),
                    degraded: false,
                }
            }
            Err(e) => {
                warn!("Generation failed, answering with the refusal: {}", e);
                Generation::refusal(true)
            }
        }
    }

    async fn complete(&self, query: &str, contexts: &[Passage]) -> AppResult<String> {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), query.to_string());
        vars.insert("excerpts".to_string(), format_excerpts(contexts));
        vars.insert("refusal".to_string(), REFUSAL.to_string());

        let built = self.prompt.render(vars)?;

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(self.temperature)
            .with_max_tokens(MAX_ANSWER_TOKENS);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = with_deadline("generation", self.timeout, self.client.complete(&request)).await?;
        Ok(response.content)
    }
}

/// Render passages as page-tagged paragraphs: `[p.12] text…`.
pub fn format_excerpts(contexts: &[Passage]) -> String {
    if contexts.is_empty() {
        return NO_EXCERPTS.to_string();
    }

    contexts
        .iter()
        .map(|p| format!("[p.{}] {}", p.page, excerpt_text(&p.text)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn excerpt_text(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > MAX_EXCERPT_CHARS {
        let cut: String = flat.chars().take(MAX_EXCERPT_CHARS).collect();
        format!("{}…", cut.trim_end())
    } else {
        flat
    }
}
