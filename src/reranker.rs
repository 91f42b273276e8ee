//! Lexical second stage: rescoring retrieved chunks against the query.
//!
//! The engine's own ranking is discarded. Each chunk is scored by query
//! token overlap plus phrase and identifier bonuses, less a small penalty
//! for long texts, and the list is sorted by that score.

use std::collections::HashSet;

use rayon::prelude::*;

use crate::{
    document::DocumentChunk,
    tokenizer::{Tokens, is_identifier_token, tokenize},
};

/// Bonus for the whole query appearing as a phrase in the text.
const PHRASE_BONUS: f64 = 2.0;

/// Bonus per identifier-like query token found in the text.
const IDENTIFIER_BONUS: f64 = 1.5;

/// Divisor of the logarithmic length penalty.
const LENGTH_PENALTY_SCALE: f64 = 10.0;

/// A retrieved chunk with its lexical score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

/// Score `text` against `query`.
///
/// ```text
/// score = overlap + 2.0 * phrase + 1.5 * identifier_hits - ln(1 + n) / 10
/// ```
///
/// `overlap` counts query tokens present in the text, `phrase` is 1 when
/// the lowercased query tokens joined by spaces occur in the lowercased
/// text tokens joined the same way, `identifier_hits` counts query tokens
/// written like codes or names (a digit, or all capitals) that occur in
/// the text, and `n` is the number of text tokens. When either side has no
/// tokens the score is just `overlap`.
///
/// # Examples
///
/// ```
/// use docseek::reranker::score;
///
/// let exact = score("borrow checker", "the borrow checker rejects this");
/// let scattered = score("borrow checker", "checker code may borrow this");
/// assert!(exact > scattered);
/// ```
pub fn score(query: &str, text: &str) -> f64 {
    score_tokens(&tokenize(query), text)
}

fn score_tokens(query: &Tokens, text: &str) -> f64 {
    let text = tokenize(text);
    let text_set: HashSet<&str> =
        text.lower.iter().map(String::as_str).collect();

    let overlap = query
        .lower
        .iter()
        .filter(|t| text_set.contains(t.as_str()))
        .count() as f64;
    if query.is_empty() || text.is_empty() {
        return overlap;
    }

    let phrase = if text.lower.join(" ").contains(&query.lower.join(" ")) {
        1.0
    } else {
        0.0
    };

    let identifier_hits = query
        .original
        .iter()
        .zip(&query.lower)
        .filter(|(original, lower)| {
            is_identifier_token(original) && text_set.contains(lower.as_str())
        })
        .count() as f64;

    let length_penalty = (text.len() as f64).ln_1p() / LENGTH_PENALTY_SCALE;

    overlap + PHRASE_BONUS * phrase + IDENTIFIER_BONUS * identifier_hits
        - length_penalty
}

/// Score every chunk against `query` and sort by score, best first.
///
/// Scoring runs in parallel. The sort is stable, so equal scores keep
/// their input order.
pub fn rerank(query: &str, chunks: Vec<DocumentChunk>) -> Vec<ScoredChunk> {
    let query = tokenize(query);
    let mut scored: Vec<ScoredChunk> = chunks
        .into_par_iter()
        .map(|chunk| {
            let score = score_tokens(&query, &chunk.content);
            ScoredChunk { chunk, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::engine::testing::chunk;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn formula_components() {
        // 4 text tokens; overlap 2, phrase match, no identifiers.
        let s = score("rust borrow", "the rust borrow checker");
        assert!(close(s, 2.0 + 2.0 - 5f64.ln() / 10.0));
    }

    #[test]
    fn identifier_tokens_get_a_bonus() {
        // "HTTP2" and "TLS" are identifiers; "config" is not.
        let s = score("HTTP2 TLS config", "tls then http2");
        assert!(close(s, 2.0 + 1.5 * 2.0 - 4f64.ln() / 10.0));
    }

    #[test]
    fn identifier_needs_a_text_match() {
        let with = score("NASA budget", "nasa budget report");
        let without = score("nasa budget", "nasa budget report");
        assert!(close(with - without, 1.5));
    }

    #[test]
    fn empty_sides_short_circuit() {
        assert_eq!(score("", "some text"), 0.0);
        assert_eq!(score("query", ""), 0.0);
        assert_eq!(score("?!", "..."), 0.0);
    }

    #[test]
    fn phrase_match_beats_scattered_overlap() {
        let phrase = score("memory safety", "rust gives memory safety today");
        let scattered = score("memory safety", "safety first for memory today");
        assert!(phrase > scattered);
    }

    #[test]
    fn scoring_ignores_case() {
        assert!(close(
            score("Hello World", "hello world text"),
            score("hello world", "HELLO WORLD TEXT")
        ));
    }

    #[test]
    fn longer_texts_are_penalised() {
        let short = score("tokio", "tokio runtime");
        let long = score("tokio", &format!("tokio {}", "filler ".repeat(50)));
        assert!(short > long);
    }

    #[test]
    fn rerank_sorts_descending_and_keeps_ties_in_order() {
        let chunks = vec![
            chunk("none", "unrelated words"),
            chunk("tie-a", "some tokio"),
            chunk("best", "the tokio runtime handles tasks"),
            chunk("tie-b", "more tokio"),
        ];

        let ranked = rerank("tokio runtime", chunks);
        let order: Vec<_> = ranked.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(order, vec!["best", "tie-a", "tie-b", "none"]);
        assert!(
            ranked
                .windows(2)
                .all(|pair| pair[0].score >= pair[1].score)
        );
    }

    proptest! {
        #[test]
        fn text_case_does_not_change_score(
            query in "[A-Za-z0-9 ]{0,40}",
            text in "[A-Za-z0-9 ,.]{0,200}",
        ) {
            let lower = score(&query, &text.to_lowercase());
            let upper = score(&query, &text.to_uppercase());
            prop_assert!(close(lower, upper));
        }

        #[test]
        fn rerank_is_a_sorted_permutation(
            texts in prop::collection::vec("[a-c ]{0,30}", 0..20),
        ) {
            let chunks: Vec<_> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| chunk(&i.to_string(), t))
                .collect();
            let ranked = rerank("a b", chunks);
            prop_assert_eq!(ranked.len(), texts.len());
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
