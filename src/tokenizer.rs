//! Word tokenization shared by keyword extraction and reranking.
//!
//! A token is a maximal run of Unicode letters, ASCII decimal digits or
//! underscores. Everything else separates tokens and is dropped. Runs are
//! found greedily by character class, with no dictionary-based word
//! segmentation, so a contiguous run of CJK ideographs is a single token.

/// Parallel original-case and lowercased token sequences of one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    /// Tokens exactly as they appear in the input.
    pub original: Vec<String>,
    /// The same tokens, lowercased. Always the same length as `original`.
    pub lower: Vec<String>,
}

impl Tokens {
    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }
}

/// Whether `c` belongs inside a token.
pub fn is_token_char(c: char) -> bool {
    c.is_alphabetic() || c.is_ascii_digit() || c == '_'
}

/// Split `text` into tokens, preserving input order.
///
/// # Examples
///
/// ```
/// use docseek::tokenizer::tokenize;
///
/// let tokens = tokenize("Read RFC-2616, then HTTP/2!");
/// assert_eq!(tokens.original, vec!["Read", "RFC", "2616", "then", "HTTP", "2"]);
/// assert_eq!(tokens.lower, vec!["read", "rfc", "2616", "then", "http", "2"]);
/// ```
pub fn tokenize(text: &str) -> Tokens {
    let mut original = Vec::new();
    for run in text.split(|c: char| !is_token_char(c)) {
        if !run.is_empty() {
            original.push(run.to_string());
        }
    }
    let lower = original.iter().map(|t| t.to_lowercase()).collect();
    Tokens { original, lower }
}

/// Whether an original-case token looks like an identifier or code.
///
/// True when the token contains a digit, or when it consists solely of
/// letters that are all uppercase (`NASA`, `TCP`).
pub fn is_identifier_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    if token.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    token.chars().all(|c| c.is_alphabetic() && c.is_uppercase())
}
