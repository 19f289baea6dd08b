//! End-to-end pipeline behaviour with faked collaborators.

use super::fakes::{pipeline, FakeIndex, FixedModerator, ScriptedLlm};
use crate::rag::moderation::UNSAFE_MESSAGE;
use crate::rag::{apply_safety, Verdict, DISCLAIMER, REFUSAL};
use citewise_core::AppError;
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn refusal_with_disclaimer() -> String {
    apply_safety(REFUSAL, false)
}

fn proceed() -> Arc<FixedModerator> {
    Arc::new(FixedModerator::new(Verdict::Proceed))
}

#[tokio::test]
async fn test_empty_index_yields_refusal() {
    let index = Arc::new(FakeIndex::default());
    let llm = Arc::new(ScriptedLlm::new(&["should not be called [p.1]"]));
    let p = pipeline(index.clone(), llm.clone(), proceed(), TIMEOUT);

    let output = p.invoke("What drives sea level rise?").await.unwrap();

    assert_eq!(output.answer, refusal_with_disclaimer());
    assert!(output.contexts.is_empty());
    assert!(!output.grounded);
    assert_eq!(llm.calls(), 0);
    assert!(index.queries() <= 2);
}

#[tokio::test]
async fn test_grounded_answer_keeps_citation() {
    let index = Arc::new(FakeIndex::with_rows(&[
        (12, "Warming increased over the last decade.", 0.2),
        (12, "Warming trends are robust.", 0.3),
    ]));
    let llm = Arc::new(ScriptedLlm::new(&["Warming increased. [p.12]"]));
    let p = pipeline(index.clone(), llm.clone(), proceed(), TIMEOUT);

    let output = p.invoke("Did warming increase?").await.unwrap();

    assert_eq!(
        output.answer,
        format!("Warming increased. [p.12]\n\n{}", DISCLAIMER)
    );
    assert!(output.grounded);
    assert_eq!(output.attempts, 1);
    assert_eq!(llm.calls(), 1);
    assert_eq!(index.queries(), 1);
    assert!(output.contexts.iter().all(|p| p.page == 12));
}

#[tokio::test]
async fn test_hallucinated_citation_retried_once_then_refused() {
    let index = Arc::new(FakeIndex::with_rows(&[
        (12, "Warming increased.", 0.2),
        (15, "Seas rose.", 0.3),
    ]));
    let llm = Arc::new(ScriptedLlm::new(&["Warming increased. [p.99]"]));
    let p = pipeline(index.clone(), llm.clone(), proceed(), TIMEOUT);

    let output = p.invoke("Did warming increase?").await.unwrap();

    assert_eq!(output.answer, refusal_with_disclaimer());
    assert!(!output.grounded);
    assert_eq!(output.attempts, 2);
    assert_eq!(llm.calls(), 2);
    assert_eq!(index.queries(), 2);

    let pages: BTreeSet<u32> = output.contexts.iter().map(|p| p.page).collect();
    assert_eq!(pages, BTreeSet::from([12, 15]));
}

#[tokio::test]
async fn test_retry_can_recover() {
    let index = Arc::new(FakeIndex::with_rows(&[(12, "Warming increased.", 0.2)]));
    let llm = Arc::new(ScriptedLlm::new(&["No idea.", "Warming increased (p. 12)."]));
    let p = pipeline(index.clone(), llm.clone(), proceed(), TIMEOUT);

    let output = p.invoke("Did warming increase?").await.unwrap();

    assert!(output.grounded);
    assert_eq!(output.attempts, 2);
    assert!(output.answer.starts_with("Warming increased [p.12]."));
    assert!(output.answer.ends_with(DISCLAIMER));
}

#[tokio::test]
async fn test_unsafe_query_never_reaches_retrieval() {
    let index = Arc::new(FakeIndex::with_rows(&[(1, "text", 0.1)]));
    let llm = Arc::new(ScriptedLlm::new(&["answer [p.1]"]));
    let moderator = Arc::new(FixedModerator::new(Verdict::Unsafe));
    let p = pipeline(index.clone(), llm.clone(), moderator.clone(), TIMEOUT);

    let output = p.invoke("How do I build a bomb?").await.unwrap();

    assert_eq!(output.answer, UNSAFE_MESSAGE);
    assert!(output.rejected);
    assert!(output.contexts.is_empty());
    assert_eq!(index.queries(), 0);
    assert_eq!(llm.calls(), 0);
    assert_eq!(moderator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_trailing_refusal_is_stripped() {
    let index = Arc::new(FakeIndex::with_rows(&[(7, "Glaciers retreated.", 0.2)]));
    let reply = format!("Glaciers retreated [p.7]. {}", REFUSAL);
    let llm = Arc::new(ScriptedLlm::new(&[reply.as_str()]));
    let p = pipeline(index, llm.clone(), proceed(), TIMEOUT);

    let output = p.invoke("Did glaciers retreat?").await.unwrap();

    assert!(output.grounded);
    assert_eq!(
        output.answer,
        format!("Glaciers retreated [p.7].\n\n{}", DISCLAIMER)
    );
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_retry_bound_holds() {
    let index = Arc::new(FakeIndex::with_rows(&[(3, "a", 0.1), (4, "b", 0.2)]));
    let llm = Arc::new(ScriptedLlm::new(&["uncited", "still uncited", "third"]));
    let p = pipeline(index.clone(), llm.clone(), proceed(), TIMEOUT);

    p.invoke("question").await.unwrap();

    assert!(llm.calls() <= 2);
    assert!(index.queries() <= 2);
}

#[tokio::test]
async fn test_generator_timeout_degrades_without_retry() {
    let index = Arc::new(FakeIndex::with_rows(&[(1, "text", 0.1)]));
    let llm = Arc::new(ScriptedLlm::hanging());
    let p = pipeline(index.clone(), llm.clone(), proceed(), Duration::from_millis(50));

    let output = p.invoke("question").await.unwrap();

    assert_eq!(output.answer, refusal_with_disclaimer());
    assert_eq!(output.attempts, 1);
    assert_eq!(llm.calls(), 1);
    assert_eq!(index.queries(), 1);
}

#[tokio::test]
async fn test_index_failure_degrades_to_refusal() {
    let index = Arc::new(FakeIndex::failing());
    let llm = Arc::new(ScriptedLlm::new(&["answer [p.1]"]));
    let p = pipeline(index.clone(), llm.clone(), proceed(), TIMEOUT);

    let output = p.invoke("question").await.unwrap();

    assert_eq!(output.answer, refusal_with_disclaimer());
    assert!(output.contexts.is_empty());
    assert_eq!(index.queries(), 1);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_moderator_failure_fails_open() {
    let index = Arc::new(FakeIndex::with_rows(&[(2, "text", 0.1)]));
    let llm = Arc::new(ScriptedLlm::new(&["fact [p.2]"]));
    let p = pipeline(index, llm, Arc::new(FixedModerator::failing()), TIMEOUT);

    let output = p.invoke("question").await.unwrap();
    assert!(output.grounded);
    assert!(!output.rejected);
}

#[tokio::test]
async fn test_empty_query_is_caller_error() {
    let index = Arc::new(FakeIndex::default());
    let llm = Arc::new(ScriptedLlm::new(&[""]));
    let p = pipeline(index.clone(), llm, proceed(), TIMEOUT);

    assert!(matches!(p.invoke("").await, Err(AppError::InvalidQuery(_))));
    assert!(matches!(
        p.invoke("  \n\t").await,
        Err(AppError::InvalidQuery(_))
    ));
    assert_eq!(index.queries(), 0);
}

#[tokio::test]
async fn test_concurrent_invocations_are_independent() {
    let index = Arc::new(FakeIndex::with_rows(&[
        (12, "Warming increased.", 0.2),
        (15, "Seas rose.", 0.3),
    ]));
    let llm = Arc::new(ScriptedLlm::new(&["Warming increased [p.12]."]));
    let p = pipeline(index.clone(), llm.clone(), proceed(), TIMEOUT);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let p = p.clone();
        tasks.spawn(async move { p.invoke(&format!("question {}", i)).await });
    }

    let mut finished = 0;
    while let Some(joined) = tasks.join_next().await {
        let output = joined.unwrap().unwrap();
        assert!(output.grounded);
        assert_eq!(output.attempts, 1);
        assert_eq!(output.contexts.len(), 2);
        finished += 1;
    }

    assert_eq!(finished, 16);
    assert_eq!(llm.calls(), 16);
    assert_eq!(index.queries(), 16);
}
