//! Input moderation.
//!
//! A moderator gates queries before retrieval. Rejected queries get a fixed
//! message and never reach the retriever or the generator.

use citewise_core::{AppError, AppResult, ModerationConfig};
use citewise_llm::{LlmClient, LlmRequest};
use citewise_prompt::{load_prompt, PromptRenderer, MODERATION_PROMPT_ID};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Moderation outcome for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Proceed,
    Unsafe,
    OffTopic,
}

pub const UNSAFE_MESSAGE: &str =
    "Sorry, I can't help with questions about dangerous or unethical topics.";

pub const OFF_TOPIC_MESSAGE: &str =
    "Sorry, I can only answer questions about the documents I have indexed.";

impl Verdict {
    /// The fixed reply for a rejected query; `None` for [`Verdict::Proceed`].
    pub fn rejection_message(&self) -> Option<&'static str> {
        match self {
            Self::Proceed => None,
            Self::Unsafe => Some(UNSAFE_MESSAGE),
            Self::OffTopic => Some(OFF_TOPIC_MESSAGE),
        }
    }

    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Proceed)
    }

    /// Read a classifier label. Unrecognized output proceeds.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.contains("unsafe") {
            Self::Unsafe
        } else if label.contains("off_topic") || label.contains("off-topic") {
            Self::OffTopic
        } else {
            Self::Proceed
        }
    }
}

/// Trait for query classifiers.
#[async_trait::async_trait]
pub trait Moderator: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn classify(&self, query: &str) -> AppResult<Verdict>;
}

/// Create the moderator described by `config`.
///
/// The `llm` moderator shares the generator client and loads the
/// `moderation.classify` prompt from `workspace`.
pub fn create_moderator(
    config: &ModerationConfig,
    workspace: &Path,
    client: Arc<dyn LlmClient>,
    model: &str,
) -> AppResult<Arc<dyn Moderator>> {
    if !config.enabled {
        return Ok(Arc::new(NoopModerator));
    }

    match config.provider.as_str() {
        "keyword" => Ok(Arc::new(KeywordModerator::new(config.topic_keywords.clone()))),
        "llm" => {
            let prompt = PromptRenderer::new(load_prompt(workspace, MODERATION_PROMPT_ID)?)?;
            Ok(Arc::new(LlmModerator::new(
                client,
                model,
                prompt,
                config.topic.clone(),
            )))
        }
        _ => Err(AppError::Config(format!(
            "Unknown moderation provider: '{}'. Supported providers: keyword, llm",
            config.provider
        ))),
    }
}

/// Always proceeds.
#[derive(Debug, Clone, Default)]
pub struct NoopModerator;

#[async_trait::async_trait]
impl Moderator for NoopModerator {
    fn name(&self) -> &str {
        "noop"
    }

    async fn classify(&self, _query: &str) -> AppResult<Verdict> {
        Ok(Verdict::Proceed)
    }
}

const UNSAFE_WORDS: &[&str] = &[
    "bomb", "bombs", "explosive", "explosives", "weapon", "weapons", "firearm", "firearms",
    "murder", "suicide", "poison", "malware", "ransomware", "terrorist", "terrorism",
    "meth", "methamphetamine", "bioweapon", "sabotage",
];

const UNSAFE_PHRASES: &[&str] = &["self-harm", "self harm", "nerve agent", "hurt someone", "make a gun"];

/// Offline moderator: unsafe vocabulary plus an optional topic word list.
#[derive(Debug, Clone, Default)]
pub struct KeywordModerator {
    /// Each keyword as its lowercase word sequence
    topic_keywords: Vec<Vec<String>>,
}

impl KeywordModerator {
    /// An empty `topic_keywords` list disables the topicality check.
    pub fn new(topic_keywords: Vec<String>) -> Self {
        Self {
            topic_keywords: topic_keywords
                .iter()
                .map(|k| {
                    k.to_lowercase()
                        .unicode_words()
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn verdict(&self, query: &str) -> Verdict {
        let lower = query.to_lowercase();
        let sequence: Vec<&str> = lower.unicode_words().collect();
        let words: HashSet<&str> = sequence.iter().copied().collect();

        let unsafe_word = UNSAFE_WORDS.iter().any(|w| words.contains(w));
        let unsafe_phrase = UNSAFE_PHRASES.iter().any(|p| lower.contains(p));
        if unsafe_word || unsafe_phrase {
            return Verdict::Unsafe;
        }

        if !self.topic_keywords.is_empty()
            && !self
                .topic_keywords
                .iter()
                .any(|keyword| contains_words(&sequence, keyword))
        {
            return Verdict::OffTopic;
        }

        Verdict::Proceed
    }
}

/// Whether `keyword` occurs in `words` as consecutive whole words.
fn contains_words(words: &[&str], keyword: &[String]) -> bool {
    words
        .windows(keyword.len())
        .any(|window| window.iter().zip(keyword).all(|(w, k)| *w == k.as_str()))
}

#[async_trait::async_trait]
impl Moderator for KeywordModerator {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, query: &str) -> AppResult<Verdict> {
        Ok(self.verdict(query))
    }
}

/// Classifier prompt run through the generator.
pub struct LlmModerator {
    client: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptRenderer,
    topic: String,
}

impl std::fmt::Debug for LlmModerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmModerator")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .field("topic", &self.topic)
            .finish()
    }
}

impl LlmModerator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        prompt: PromptRenderer,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            prompt,
            topic: topic.into(),
        }
    }
}

#[async_trait::async_trait]
impl Moderator for LlmModerator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn classify(&self, query: &str) -> AppResult<Verdict> {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), query.to_string());
        vars.insert("topic".to_string(), self.topic.clone());
        let built = self.prompt.render(vars)?;

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(0.0)
            .with_max_tokens(8);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = self.client.complete(&request).await?;
        let verdict = Verdict::from_label(&response.content);
        tracing::debug!(label = %response.content.trim(), ?verdict, "Moderation label");
        Ok(verdict)
    }
}
