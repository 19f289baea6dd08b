//! Prompt definitions compiled into the binary.

use crate::types::PromptDefinition;
use citewise_core::{AppError, AppResult};

/// Prompt used by the generator wrapper.
pub const ANSWER_PROMPT_ID: &str = "answer.grounded";

/// Prompt used by the LLM-backed moderator.
pub const MODERATION_PROMPT_ID: &str = "moderation.classify";

const BUILTIN_PROMPTS: [(&str, &str); 2] = [
    (ANSWER_PROMPT_ID, include_str!("../prompts/answer.grounded.yml")),
    (MODERATION_PROMPT_ID, include_str!("../prompts/moderation.classify.yml")),
];

/// Ids of every built-in prompt.
pub fn builtin_ids() -> impl Iterator<Item = &'static str> {
    BUILTIN_PROMPTS.iter().map(|(id, _)| *id)
}

/// Parse the built-in definition for `prompt_id`, if there is one.
pub fn builtin(prompt_id: &str) -> Option<AppResult<PromptDefinition>> {
    BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .map(|(id, source)| {
            serde_yaml::from_str(source).map_err(|e| {
                AppError::Prompt(format!("Built-in prompt {} is invalid: {}", id, e))
            })
        })
}
