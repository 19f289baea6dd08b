//! Page citation handling.
//!
//! Generators render page references in many shapes. Everything downstream
//! only understands the canonical `[p.N]` token, so generator output goes
//! through [`normalize_citations`] exactly once.

use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// The fixed answer used whenever grounding cannot be established.
pub const REFUSAL: &str =
    "I have not found sufficient evidence in the source documents to answer with confidence.";

/// Canonical citation token.
static CANONICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[p\.(\d+)\]").expect("valid regex"));

/// Variant citation renderings, rewritten in order. The last pattern also
/// matches canonical tokens, which only strips leading zeros.
static VARIANTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // (p.[34])
        r"(?i)\(\s*p\.\s*\[\s*(\d+)\s*\]\s*\)",
        // p.[34]
        r"(?i)\bp\.\s*\[\s*(\d+)\s*\]",
        // (p. 34) (p 34) (pg.34) (page 34)
        r"(?i)\(\s*(?:page|pg|p)\.?\s*(\d+)\s*\)",
        // [p 34] [pg.34] [page 34] [P. 34]
        r"(?i)\[\s*(?:page|pg|p)\s*\.?\s*(\d+)\s*\]",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

static REFUSAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let sentence = regex::escape(REFUSAL.trim_end_matches('.'));
    Regex::new(&format!(r"(?i){}\.?", sentence)).expect("valid regex")
});

static EXTRA_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

fn canonical_token(caps: &Captures) -> String {
    match caps[1].parse::<u32>() {
        Ok(page) => format!("[p.{}]", page),
        Err(_) => caps[0].to_string(),
    }
}

/// Rewrite every recognized citation form to `[p.N]` and drop immediate
/// repeats of the same token.
///
/// Idempotent: `normalize_citations(normalize_citations(t)) == normalize_citations(t)`.
pub fn normalize_citations(text: &str) -> String {
    let mut normalized = text.to_string();
    for pattern in VARIANTS.iter() {
        normalized = pattern
            .replace_all(&normalized, canonical_token)
            .into_owned();
    }
    dedupe_adjacent(&normalized)
}

/// Remove a citation token that repeats the previous one with only
/// whitespace in between: `[p.3] [p.3]` becomes `[p.3]`.
fn dedupe_adjacent(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut previous: Option<(&str, usize)> = None;

    for token in CANONICAL.find_iter(text) {
        let gap = &text[cursor..token.start()];
        let repeats = matches!(
            previous,
            Some((prev, prev_end)) if prev == token.as_str()
                && text[prev_end..token.start()].trim().is_empty()
        );

        if !repeats {
            out.push_str(gap);
            out.push_str(token.as_str());
        }

        previous = Some((token.as_str(), token.end()));
        cursor = token.end();
    }

    out.push_str(&text[cursor..]);
    out
}

/// Pages referenced by canonical citation tokens.
pub fn cited_pages(text: &str) -> BTreeSet<u32> {
    CANONICAL
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

pub fn has_citation(text: &str) -> bool {
    CANONICAL.is_match(text)
}

/// Whether `text` contains the canonical refusal sentence (case-insensitive).
pub fn contains_refusal(text: &str) -> bool {
    REFUSAL_PATTERN.is_match(text)
}

/// Remove every occurrence of the refusal sentence and tidy the spacing
/// left behind.
pub fn strip_refusal(text: &str) -> String {
    let stripped = REFUSAL_PATTERN.replace_all(text, "");
    let tidied = EXTRA_SPACE.replace_all(&stripped, " ");
    tidied
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_become_canonical() {
        let cases = [
            ("Warming (p. 34).", "Warming [p.34]."),
            ("Warming (p 34).", "Warming [p.34]."),
            ("Warming [p 34].", "Warming [p.34]."),
            ("Warming [pg.34].", "Warming [p.34]."),
            ("Warming [P. 34].", "Warming [p.34]."),
            ("Warming (page 34).", "Warming [p.34]."),
            ("Warming p.[34].", "Warming [p.34]."),
            ("Warming (p.[34]).", "Warming [p.34]."),
            ("Warming [p.034].", "Warming [p.34]."),
        ];

        for (input, expected) in cases {
            assert_eq!(normalize_citations(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_dedupes_immediate_repeats() {
        assert_eq!(normalize_citations("Rise [p.3] [p.3]."), "Rise [p.3].");
        assert_eq!(normalize_citations("Rise [p.3][p.3][p.3]."), "Rise [p.3].");
        assert_eq!(normalize_citations("Rise (p. 3) [p 3]."), "Rise [p.3].");
    }

    #[test]
    fn test_keeps_distinct_and_separated_repeats() {
        assert_eq!(normalize_citations("A [p.3] [p.4]."), "A [p.3] [p.4].");
        assert_eq!(
            normalize_citations("A [p.3]. B [p.3]."),
            "A [p.3]. B [p.3]."
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            "Sea level rose (p. 12) and [pg.15] [p 15]; see p.[7] (page 007).",
            "No citations here.",
            "[p.1] [p.1]\n[p.1]",
            "Odd (p.) and [p.] forms stay",
            "Step.[2] is not a page",
        ];

        for input in inputs {
            let once = normalize_citations(input);
            assert_eq!(normalize_citations(&once), once, "input: {}", input);
        }
    }

    #[test]
    fn test_leaves_unrelated_text_alone() {
        let text = "Emissions fell in 2020 (see Table 3) [1].";
        assert_eq!(normalize_citations(text), text);
    }

    #[test]
    fn test_oversized_page_number_left_unchanged() {
        let text = "See [p 99999999999].";
        assert_eq!(normalize_citations(text), text);
        assert!(cited_pages(text).is_empty());
    }

    #[test]
    fn test_cited_pages() {
        let pages = cited_pages("A [p.12]. B [p.15] and [p.12].");
        assert_eq!(pages, BTreeSet::from([12, 15]));
        assert!(has_citation("x [p.1]"));
        assert!(!has_citation("x (p. 1)"));
    }

    #[test]
    fn test_refusal_has_no_citation() {
        assert!(!has_citation(REFUSAL));
        assert!(!has_citation(&normalize_citations(REFUSAL)));
        assert!(cited_pages(REFUSAL).is_empty());
    }

    #[test]
    fn test_refusal_detection() {
        assert!(contains_refusal(REFUSAL));
        assert!(contains_refusal(&format!("Warming [p.7]. {}", REFUSAL)));
        assert!(contains_refusal(&REFUSAL.to_uppercase()));
        assert!(!contains_refusal("I have found evidence [p.7]."));
    }

    #[test]
    fn test_strip_refusal() {
        let text = format!("Warming increased [p.7]. {}", REFUSAL);
        assert_eq!(strip_refusal(&text), "Warming increased [p.7].");

        let text = format!("{}  Warming increased [p.7].", REFUSAL);
        assert_eq!(strip_refusal(&text), "Warming increased [p.7].");

        assert_eq!(strip_refusal(REFUSAL), "");
    }
}
