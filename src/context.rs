//! Packing ranked chunks into a language model context under a token
//! budget.

use serde::Serialize;

use crate::{
    error::{Error, Result},
    reranker::ScoredChunk,
};

pub const DEFAULT_TOKEN_BUDGET: usize = 3000;

/// Placed between consecutive chunk blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Most estimated tokens the assembled context may hold.
    pub token_budget: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: DEFAULT_TOKEN_BUDGET,
        }
    }
}

impl ContextConfig {
    pub fn validate(&self) -> Result<()> {
        if self.token_budget == 0 {
            return Err(Error::Config("token budget must be positive".into()));
        }
        Ok(())
    }
}

/// Estimated language model tokens for a text.
///
/// Blends a per-word and a per-character estimate, takes the larger and
/// adds 10%: `round(1.1 * max(1.3 * words, chars / 4))`.
pub fn estimate_tokens(word_count: usize, char_count: usize) -> usize {
    let by_words = 1.3 * word_count as f64;
    let by_chars = char_count as f64 / 4.0;
    (1.1 * by_words.max(by_chars)).round() as usize
}

/// One chunk placed in the context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSource {
    pub id: String,
    pub file_path: String,
    pub page_number: Option<u32>,
    pub chunk_number: u32,
    pub score: f64,
    pub tokens: usize,
}

/// The packed context and what went into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub sources: Vec<ContextSource>,
    pub tokens_used: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn format_block(scored: &ScoredChunk) -> String {
    let chunk = &scored.chunk;
    let page = chunk
        .page_number
        .map_or_else(|| "n/a".to_string(), |p| p.to_string());
    format!(
        "[Source: {} | Page: {} | Chunk: {}]\n{}",
        chunk.file_path, page, chunk.chunk_number, chunk.content
    )
}

/// Pack `ranked` chunks in order until the next one would exceed the
/// budget.
///
/// The chunk that would overflow is dropped whole and packing stops there.
/// Token estimates use the chunk's word count and content length. An
/// empty result means nothing fit.
pub fn assemble(
    ranked: &[ScoredChunk],
    config: &ContextConfig,
) -> AssembledContext {
    let mut blocks = Vec::new();
    let mut sources = Vec::new();
    let mut used = 0;

    for scored in ranked {
        let chunk = &scored.chunk;
        let words = if chunk.word_count > 0 {
            chunk.word_count
        } else {
            chunk.content.split_whitespace().count()
        };
        let tokens = estimate_tokens(words, chunk.content.chars().count());
        if used + tokens > config.token_budget {
            break;
        }
        used += tokens;
        blocks.push(format_block(scored));
        sources.push(ContextSource {
            id: chunk.id.clone(),
            file_path: chunk.file_path.clone(),
            page_number: chunk.page_number,
            chunk_number: chunk.chunk_number,
            score: scored.score,
            tokens,
        });
    }

    AssembledContext {
        text: blocks.join(BLOCK_SEPARATOR),
        sources,
        tokens_used: used,
    }
}
