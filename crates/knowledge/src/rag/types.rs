//! Answer pipeline types.

use crate::rag::moderation::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A retrieved chunk of page text with its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    /// Chunk id in the vector index
    pub id: String,

    pub text: String,

    /// Page the text comes from
    pub page: u32,

    /// Cosine similarity in [0, 1]
    pub vector_score: f32,

    /// Squashed cross-encoder score in [0, 1], when reranked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,

    /// Score the passage was ranked by
    pub final_score: f32,
}

/// Ordered passages handed to the generator.
pub type ContextSet = Vec<Passage>;

/// Distinct pages present in `contexts`.
pub fn context_pages(contexts: &[Passage]) -> BTreeSet<u32> {
    contexts.iter().map(|p| p.page).collect()
}

/// Generator output after citation normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftAnswer {
    pub text: String,
    pub cited_pages: BTreeSet<u32>,
}

impl DraftAnswer {
    /// Build a draft from already-normalized text.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cited_pages = crate::rag::citation::cited_pages(&text);
        Self { text, cited_pages }
    }
}

/// Why the validator rejected a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The draft was the refusal sentence and nothing else
    Refusal,
    /// The draft carried no page citation
    NoCitation,
    /// None of the cited pages were among the retrieved pages
    CitationOutsideContext,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refusal => "refusal",
            Self::NoCitation => "no_citation",
            Self::CitationOutsideContext => "citation_outside_context",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// The draft text, or the canonical refusal when rejected
    pub answer: String,
    pub contexts: ContextSet,
    pub ok: bool,
    pub reason: Option<RejectReason>,
}

/// Orchestrator stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Start,
    Moderate,
    Retrieve,
    Answer,
    Validate,
    Finalize,
    End,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Moderate => "moderate",
            Self::Retrieve => "retrieve",
            Self::Answer => "answer",
            Self::Validate => "validate",
            Self::Finalize => "finalize",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation state, owned by one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub query: String,
    pub contexts: Option<ContextSet>,
    pub draft: Option<DraftAnswer>,
    /// Current answer text (validated draft, refusal or rejection message)
    pub answer: Option<String>,
    pub ok: Option<bool>,
    /// Retries consumed so far
    pub tries: u32,
    pub stage: Stage,
    /// Set when moderation stopped the query
    pub rejection: Option<Verdict>,
    /// Set when a collaborator failed or timed out during this run
    pub degraded: bool,
}

impl PipelineState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            contexts: None,
            draft: None,
            answer: None,
            ok: None,
            tries: 0,
            stage: Stage::Start,
            rejection: None,
            degraded: false,
        }
    }
}

/// Result of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub answer: String,
    pub contexts: ContextSet,

    /// Internal: whether the final answer passed validation
    #[serde(skip_serializing, default)]
    pub grounded: bool,

    /// Internal: number of retrieve/answer attempts made
    #[serde(skip_serializing, default)]
    pub attempts: u32,

    /// Internal: whether moderation rejected the query
    #[serde(skip_serializing, default)]
    pub rejected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(page: u32) -> Passage {
        Passage {
            id: format!("c{}", page),
            text: "text".to_string(),
            page,
            vector_score: 0.5,
            rerank_score: None,
            final_score: 0.5,
        }
    }

    #[test]
    fn test_context_pages_are_distinct() {
        let contexts = vec![passage(12), passage(15), passage(12)];
        assert_eq!(context_pages(&contexts), BTreeSet::from([12, 15]));
    }

    #[test]
    fn test_draft_collects_cited_pages() {
        let draft = DraftAnswer::new("A [p.3]. B [p.7] and [p.3].");
        assert_eq!(draft.cited_pages, BTreeSet::from([3, 7]));
    }

    #[test]
    fn test_passage_serializes_camel_case() {
        let json = serde_json::to_value(passage(4)).unwrap();
        assert_eq!(json["page"], 4);
        assert!(json.get("vectorScore").is_some());
        assert!(json.get("finalScore").is_some());
        assert!(json.get("rerankScore").is_none());
    }

    #[test]
    fn test_output_hides_diagnostics() {
        let output = PipelineOutput {
            answer: "a".to_string(),
            contexts: vec![],
            grounded: true,
            attempts: 1,
            rejected: false,
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json, serde_json::json!({"answer": "a", "contexts": []}));
    }
}
