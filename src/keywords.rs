//! Query keyword extraction.
//!
//! Keywords are the lowercased ASCII alphanumeric words of a query with
//! English stop-words removed. Characters outside `a-z0-9` (including
//! accented and non-Latin letters) act as separators, so keyword-driven
//! sub-queries are biased towards ASCII terms.

use std::{collections::HashSet, sync::LazyLock};

/// Languages with a stop-word list.
///
/// Only English exists; [`detect_language`] always selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    // articles and conjunctions
    "a", "an", "the", "and", "or", "but", "so", "if", "then", "than",
    "because",
    // prepositions
    "of", "in", "on", "at", "to", "for", "from", "by", "with", "about", "as",
    "into", "over", "under", "through",
    // pronouns
    "i", "me", "my", "we", "our", "you", "your", "he", "she", "it", "its",
    "they", "them", "their", "this", "that", "these", "those",
    // be-verbs, auxiliaries and modals
    "is", "are", "was", "were", "be", "been", "being", "am", "do", "does",
    "did", "have", "has", "had", "can", "could", "will", "would", "should",
    "may", "might", "must", "shall",
    // question words
    "what", "which", "who", "when", "where", "why", "how",
    // quantifiers and fillers
    "all", "any", "some", "each", "every", "no", "not", "more", "most",
    "very", "just", "also", "there",
    // query filler verbs
    "explain", "describe", "tell",
];

static ENGLISH: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ENGLISH_STOP_WORDS.iter().copied().collect());

/// Pick the stop-word language for a query.
///
/// This is a fixed stub: every query is treated as English.
pub fn detect_language(_query: &str) -> Language {
    Language::English
}

/// The stop-word set for a language.
pub fn stop_words(language: Language) -> &'static HashSet<&'static str> {
    match language {
        Language::English => &ENGLISH,
    }
}

/// Extract the keyword list of a query.
///
/// Order follows the query and duplicates are kept.
///
/// # Examples
///
/// ```
/// use docseek::keywords::query_keywords;
///
/// assert_eq!(
///     query_keywords("What is the capital of France?"),
///     vec!["capital", "france"]
/// );
/// ```
pub fn query_keywords(query: &str) -> Vec<String> {
    let stop = stop_words(detect_language(query));
    let lowered = query.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|word| !stop.contains(*word))
        .map(str::to_string)
        .collect()
}
