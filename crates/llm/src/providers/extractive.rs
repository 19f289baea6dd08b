//! Offline extractive generator.
//!
//! Quotes the first sentence of the first page-tagged excerpt found in the
//! prompt (`[p.12] some text`) and cites it. It never calls out of process,
//! which makes the whole pipeline usable without a model server.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use citewise_core::AppResult;

/// Longest quote returned, in characters.
const MAX_QUOTE_CHARS: usize = 320;

/// Deterministic generator that answers by quotation.
#[derive(Debug, Default, Clone)]
pub struct ExtractiveClient;

impl ExtractiveClient {
    pub fn new() -> Self {
        Self
    }
}

/// Find the first line shaped like `[p.<digits>] <text>`.
fn first_excerpt(prompt: &str) -> Option<(&str, &str)> {
    prompt.lines().find_map(|line| {
        let line = line.trim_start();
        let rest = line.strip_prefix("[p.")?;
        let close = rest.find(']')?;
        let page = &rest[..close];
        if page.is_empty() || !page.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let text = rest[close + 1..].trim();
        if text.is_empty() {
            return None;
        }
        Some((page, text))
    })
}

fn first_sentence(text: &str) -> String {
    let end = text
        .char_indices()
        .find(|&(i, c)| matches!(c, '.' | '!' | '?') && text[i + c.len_utf8()..].starts_with(' '))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(text.len());

    let sentence = text[..end].trim_end_matches('…').trim();
    if sentence.chars().count() > MAX_QUOTE_CHARS {
        let cut: String = sentence.chars().take(MAX_QUOTE_CHARS).collect();
        format!("{}…", cut.trim_end())
    } else {
        sentence.to_string()
    }
}

#[async_trait::async_trait]
impl LlmClient for ExtractiveClient {
    fn provider_name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = match first_excerpt(&request.prompt) {
            Some((page, text)) => format!("{} [p.{}]", first_sentence(text), page),
            None => String::new(),
        };

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quotes_first_excerpt() {
        let prompt = "Question:\nWhy?\n\nExcerpts:\n[p.12] Sea level rose 20 cm. It is accelerating.\n\n[p.30] Other.";
        let client = ExtractiveClient::new();
        let response = client
            .complete(&LlmRequest::new(prompt, "quote"))
            .await
            .unwrap();
        assert_eq!(response.content, "Sea level rose 20 cm. [p.12]");
    }

    #[tokio::test]
    async fn test_no_excerpts_yields_empty_text() {
        let client = ExtractiveClient::new();
        let response = client
            .complete(&LlmRequest::new("Classify this query: hello", "quote"))
            .await
            .unwrap();
        assert!(response.content.is_empty());
    }

    #[test]
    fn test_ignores_malformed_tags() {
        assert_eq!(first_excerpt("[p.x] text\n[p.3]   \n[p.4] ok"), Some(("4", "ok")));
    }

    #[test]
    fn test_long_sentence_truncated() {
        let long = "a".repeat(400);
        let quoted = first_sentence(&long);
        assert!(quoted.ends_with('…'));
        assert_eq!(quoted.chars().count(), MAX_QUOTE_CHARS + 1);
    }
}
