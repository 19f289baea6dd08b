//! Terminal safety transform.

/// Informational notice appended to every answer.
pub const DISCLAIMER: &str = "Note: this answer is generated automatically from the indexed documents and may be incomplete; check the cited pages before relying on it.";

/// Append [`DISCLAIMER`] to `answer` once.
///
/// Moderation rejections are returned unchanged.
pub fn apply_safety(answer: &str, rejected: bool) -> String {
    let answer = answer.trim_end();
    if rejected || answer.ends_with(DISCLAIMER) {
        return answer.to_string();
    }
    if answer.is_empty() {
        return DISCLAIMER.to_string();
    }
    format!("{}\n\n{}", answer, DISCLAIMER)
}
