//! The answer pipeline as an explicit state machine.
//!
//! [`next_stage`] is the transition table; [`Pipeline`] runs one effectful
//! handler per stage and then [`advance`]s. All per-query data lives in a
//! [`PipelineState`] owned by a single invocation, so one `Pipeline` can
//! serve any number of concurrent queries.

use crate::rag::answer::Generator;
use crate::rag::citation::REFUSAL;
use crate::rag::moderation::Moderator;
use crate::rag::retriever::Retriever;
use crate::rag::safety::apply_safety;
use crate::rag::selfcheck::validate;
use crate::rag::types::{DraftAnswer, PipelineOutput, PipelineState, Stage};
use crate::rag::with_deadline;
use citewise_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Retries after a failed validation. Transport failures never retry.
pub const MAX_RETRIES: u32 = 1;

/// Upper bound on handler runs per invocation.
const MAX_STEPS: usize = 16;

/// Shared, read-only collaborators of a pipeline.
#[derive(Debug)]
pub struct PipelineContext {
    pub retriever: Retriever,
    pub generator: Generator,
    pub moderator: Arc<dyn Moderator>,
    /// Deadline for the moderation call
    pub timeout: Duration,
}

/// Stage that follows `state.stage`.
pub fn next_stage(state: &PipelineState) -> Stage {
    match state.stage {
        Stage::Start => Stage::Moderate,
        Stage::Moderate if state.rejection.is_some() => Stage::Finalize,
        Stage::Moderate => Stage::Retrieve,
        Stage::Retrieve => Stage::Answer,
        Stage::Answer => Stage::Validate,
        Stage::Validate => {
            if state.ok == Some(true) || state.degraded || state.tries >= MAX_RETRIES {
                Stage::Finalize
            } else {
                Stage::Retrieve
            }
        }
        Stage::Finalize | Stage::End => Stage::End,
    }
}

/// Move `state` to its next stage, counting a retry when validation loops
/// back to retrieval.
pub fn advance(mut state: PipelineState) -> PipelineState {
    let next = next_stage(&state);
    if state.stage == Stage::Validate && next == Stage::Retrieve {
        state.tries += 1;
    }
    debug!(from = %state.stage, to = %next, tries = state.tries, "Stage transition");
    state.stage = next;
    state
}

/// Grounded question answering over one corpus.
#[derive(Debug, Clone)]
pub struct Pipeline {
    context: Arc<PipelineContext>,
}

impl Pipeline {
    pub fn new(context: PipelineContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Answer `query`.
    ///
    /// Fails only for an empty or whitespace-only query. Collaborator
    /// failures degrade to the canonical refusal.
    pub async fn invoke(&self, query: &str) -> AppResult<PipelineOutput> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidQuery("query is empty".to_string()));
        }

        let query_id = uuid::Uuid::new_v4();
        let span = info_span!("pipeline", %query_id);
        self.run(query).instrument(span).await
    }

    async fn run(&self, query: &str) -> AppResult<PipelineOutput> {
        let mut state = PipelineState::new(query);
        let mut steps = 0;

        while state.stage != Stage::End {
            state = self.handle(state).await;
            state = advance(state);

            steps += 1;
            if steps >= MAX_STEPS && !matches!(state.stage, Stage::Finalize | Stage::End) {
                warn!("Step limit reached at stage {}, finalizing", state.stage);
                state.stage = Stage::Finalize;
            }
        }

        let output = PipelineOutput {
            answer: state.answer.unwrap_or_else(|| REFUSAL.to_string()),
            contexts: state.contexts.unwrap_or_default(),
            grounded: state.ok == Some(true),
            attempts: if state.rejection.is_some() {
                0
            } else {
                state.tries + 1
            },
            rejected: state.rejection.is_some(),
        };

        let outcome = if output.rejected {
            "rejected"
        } else if output.grounded {
            "grounded"
        } else {
            "refused"
        };
        info!(
            outcome,
            attempts = output.attempts,
            degraded = state.degraded,
            contexts = output.contexts.len(),
            "Pipeline finished"
        );

        Ok(output)
    }

    /// Run the handler for the current stage.
    async fn handle(&self, mut state: PipelineState) -> PipelineState {
        match state.stage {
            Stage::Start | Stage::End => {}

            Stage::Moderate => {
                let moderator = &self.context.moderator;
                match with_deadline(
                    "moderation",
                    self.context.timeout,
                    moderator.classify(&state.query),
                )
                .await
                {
                    Ok(verdict) => {
                        if let Some(message) = verdict.rejection_message() {
                            info!(?verdict, moderator = moderator.name(), "Query rejected");
                            state.rejection = Some(verdict);
                            state.answer = Some(message.to_string());
                        }
                    }
                    Err(e) => warn!("Moderation failed, letting the query through: {}", e),
                }
            }

            Stage::Retrieve => {
                let retrieval = self.context.retriever.retrieve_detailed(&state.query).await;
                debug!(passages = retrieval.passages.len(), "Retrieved");
                state.degraded |= retrieval.degraded;
                state.contexts = Some(retrieval.passages);
                state.draft = None;
                state.ok = None;
            }

            Stage::Answer => {
                let contexts = state.contexts.as_deref().unwrap_or_default();
                let generation = self.context.generator.generate(&state.query, contexts).await;
                state.degraded |= generation.degraded;
                state.draft = Some(generation.draft);
            }

            Stage::Validate => {
                let contexts = state.contexts.as_deref().unwrap_or_default();
                let result = match &state.draft {
                    Some(draft) => validate(draft, contexts),
                    None => validate(&DraftAnswer::new(""), contexts),
                };
                if let Some(reason) = result.reason {
                    debug!(%reason, tries = state.tries, "Validation failed");
                }
                state.ok = Some(result.ok);
                state.answer = Some(result.answer);
            }

            Stage::Finalize => {
                let answer = state.answer.take().unwrap_or_else(|| REFUSAL.to_string());
                state.answer = Some(apply_safety(&answer, state.rejection.is_some()));
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::moderation::Verdict;

    fn at(stage: Stage) -> PipelineState {
        let mut state = PipelineState::new("q");
        state.stage = stage;
        state
    }

    #[test]
    fn test_happy_path_transitions() {
        assert_eq!(next_stage(&at(Stage::Start)), Stage::Moderate);
        assert_eq!(next_stage(&at(Stage::Moderate)), Stage::Retrieve);
        assert_eq!(next_stage(&at(Stage::Retrieve)), Stage::Answer);
        assert_eq!(next_stage(&at(Stage::Answer)), Stage::Validate);
        assert_eq!(next_stage(&at(Stage::Finalize)), Stage::End);
        assert_eq!(next_stage(&at(Stage::End)), Stage::End);

        let mut validated = at(Stage::Validate);
        validated.ok = Some(true);
        assert_eq!(next_stage(&validated), Stage::Finalize);
    }

    #[test]
    fn test_rejection_skips_to_finalize() {
        let mut state = at(Stage::Moderate);
        state.rejection = Some(Verdict::Unsafe);
        assert_eq!(next_stage(&state), Stage::Finalize);
    }

    #[test]
    fn test_failed_validation_retries_once() {
        let mut state = at(Stage::Validate);
        state.ok = Some(false);

        let state = advance(state);
        assert_eq!(state.stage, Stage::Retrieve);
        assert_eq!(state.tries, 1);

        let mut state = state;
        state.stage = Stage::Validate;
        state.ok = Some(false);
        let state = advance(state);
        assert_eq!(state.stage, Stage::Finalize);
        assert_eq!(state.tries, 1);
    }

    #[test]
    fn test_degraded_run_does_not_retry() {
        let mut state = at(Stage::Validate);
        state.ok = Some(false);
        state.degraded = true;
        assert_eq!(next_stage(&state), Stage::Finalize);
    }

    #[test]
    fn test_other_transitions_keep_tries() {
        let state = advance(at(Stage::Retrieve));
        assert_eq!(state.stage, Stage::Answer);
        assert_eq!(state.tries, 0);
    }
}
