//! Text normalization shared by import and query embedding.
//!
//! Page text extracted from reports is full of layout artifacts. Index and
//! query text go through the same function so their embeddings stay
//! comparable.

use regex::Regex;
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

/// Function words ignored when comparing texts by vocabulary.
const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "why", "does", "did", "can", "will",
    "not", "than", "there", "these", "those", "into", "about",
];

/// A word split across a line break with a hyphen or soft hyphen.
static BROKEN_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w)[-\x{00AD}]\s*\n\s*(\w)").expect("valid regex")
});

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C]+").expect("valid regex"));

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n\s*").expect("valid regex"));

fn map_char(c: char) -> Option<char> {
    match c {
        '\u{2010}'..='\u{2015}' | '\u{2212}' => Some('-'),
        '\u{00AD}' => None,
        '\u{00A0}' => Some(' '),
        _ => Some(c),
    }
}

/// Normalize raw page text into a single clean line.
pub fn normalize_text(raw: &str) -> String {
    let joined = BROKEN_WORD.replace_all(raw, "${1}${2}");

    let mut text: String = joined.chars().filter_map(map_char).collect();
    text = text.replace('\u{FB01}', "fi").replace('\u{FB02}', "fl");

    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = LINE_BREAKS.replace_all(&text, " ");
    text.trim().to_string()
}

/// Lowercased content words of `text`: Unicode word segmentation, minus
/// stop words and words of two characters or fewer.
pub fn content_words(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}
