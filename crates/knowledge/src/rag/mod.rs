//! Grounded answering with page citations.
//!
//! The [`Pipeline`] moderates a query, retrieves page-tagged passages,
//! generates an answer, checks that every answer cites a retrieved page and
//! retries once before falling back to the canonical refusal.

pub mod answer;
pub mod citation;
pub mod moderation;
pub mod pipeline;
pub mod retriever;
pub mod safety;
pub mod selfcheck;
pub mod types;

pub use answer::{Generation, Generator};
pub use citation::{normalize_citations, REFUSAL};
pub use moderation::{create_moderator, KeywordModerator, LlmModerator, Moderator, NoopModerator, Verdict};
pub use pipeline::{Pipeline, PipelineContext, MAX_RETRIES};
pub use retriever::{Retrieval, Retriever};
pub use safety::{apply_safety, DISCLAIMER};
pub use selfcheck::validate;
pub use types::{
    ContextSet, DraftAnswer, Passage, PipelineOutput, PipelineState, RejectReason, Stage,
    ValidationResult,
};

use citewise_core::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;

/// Await `fut`, failing with [`AppError::Timeout`] once `limit` has passed.
pub(crate) async fn with_deadline<T, F>(stage: &str, limit: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout {
            stage: stage.to_string(),
            secs: limit.as_secs(),
        }),
    }
}
