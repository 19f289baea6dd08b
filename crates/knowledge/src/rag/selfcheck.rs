//! Citation validation.
//!
//! A draft is grounded when it cites at least one page that was actually
//! retrieved. Anything else is replaced by the canonical refusal. The
//! validator only reports; retry bookkeeping belongs to the pipeline.

use crate::rag::citation::{cited_pages, contains_refusal, has_citation, strip_refusal, REFUSAL};
use crate::rag::types::{context_pages, DraftAnswer, Passage, RejectReason, ValidationResult};
use std::collections::BTreeSet;
use tracing::debug;

/// Check `draft` against the pages in `contexts`.
pub fn validate(draft: &DraftAnswer, contexts: &[Passage]) -> ValidationResult {
    let text = draft.text.trim();
    let available = context_pages(contexts);

    let outcome = match (contains_refusal(text), has_citation(text)) {
        (true, true) => {
            let kept = strip_refusal(text);
            grounded_or_refusal(kept, &available)
        }
        (true, false) => Err(RejectReason::Refusal),
        (false, false) => Err(RejectReason::NoCitation),
        (false, true) => grounded_or_refusal(text.to_string(), &available),
    };

    match outcome {
        Ok(answer) => ValidationResult {
            answer,
            contexts: contexts.to_vec(),
            ok: true,
            reason: None,
        },
        Err(reason) => {
            debug!("Draft rejected: {}", reason);
            ValidationResult {
                answer: REFUSAL.to_string(),
                contexts: contexts.to_vec(),
                ok: false,
                reason: Some(reason),
            }
        }
    }
}

fn grounded_or_refusal(answer: String, available: &BTreeSet<u32>) -> Result<String, RejectReason> {
    let cited = cited_pages(&answer);
    if cited.is_disjoint(available) {
        debug!(?cited, ?available, "Cited pages are not among retrieved pages");
        Err(RejectReason::CitationOutsideContext)
    } else {
        Ok(answer)
    }
}
