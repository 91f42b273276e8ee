//! Multi-query lexical retrieval.
//!
//! One search with the full query is followed by searches for short
//! keyword phrases. Each phrase only adds chunks not seen before, and
//! fan-out stops once the result cap is reached. Sub-queries run one at a
//! time, so results merge in a fixed order.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::{
    document::DocumentChunk,
    engine::{SearchEngine, SearchRequest},
    error::{Error, Result},
    keywords::query_keywords,
};

pub const DEFAULT_INITIAL_LIMIT: usize = 30;
pub const DEFAULT_PHRASE_LIMIT: usize = 8;
pub const DEFAULT_MAX_PHRASE_WORDS: usize = 3;
pub const DEFAULT_RESULT_CAP: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Hits requested by the full-query search.
    pub initial_limit: usize,
    /// Hits requested by each phrase search.
    pub phrase_limit: usize,
    /// Longest phrase, in keywords.
    pub max_phrase_words: usize,
    /// Most chunks one retrieval returns.
    pub cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            initial_limit: DEFAULT_INITIAL_LIMIT,
            phrase_limit: DEFAULT_PHRASE_LIMIT,
            max_phrase_words: DEFAULT_MAX_PHRASE_WORDS,
            cap: DEFAULT_RESULT_CAP,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("initial limit", self.initial_limit),
            ("phrase limit", self.phrase_limit),
            ("max phrase words", self.max_phrase_words),
            ("result cap", self.cap),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(Error::Config(format!(
                    "retrieval {name} must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Phrase sub-queries for a keyword list.
///
/// Phrases of one word come first, then two, up to `max_words`. Within a
/// length the window slides from the end of the list towards the start,
/// since trailing keywords of a question tend to be the specific ones.
/// Repeated phrases are returned once.
///
/// # Examples
///
/// ```
/// use docseek::retriever::phrase_queries;
///
/// let keywords = vec!["tokio".to_string(), "runtime".into(), "shutdown".into()];
/// assert_eq!(
///     phrase_queries(&keywords, 2),
///     vec!["shutdown", "runtime", "tokio", "runtime shutdown", "tokio runtime"]
/// );
/// ```
pub fn phrase_queries(keywords: &[String], max_words: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut phrases = Vec::new();
    for len in 1..=max_words.min(keywords.len()) {
        for start in (0..=keywords.len() - len).rev() {
            let phrase = keywords[start..start + len].join(" ");
            if seen.insert(phrase.clone()) {
                phrases.push(phrase);
            }
        }
    }
    phrases
}

/// Chunks collected by one retrieval, unique by id and bounded by a cap.
///
/// The first chunk seen with an id wins.
#[derive(Debug)]
pub struct ResultSet {
    chunks: Vec<DocumentChunk>,
    seen: HashSet<String>,
    cap: usize,
}

impl ResultSet {
    pub fn new(cap: usize) -> Self {
        Self {
            chunks: Vec::new(),
            seen: HashSet::new(),
            cap,
        }
    }

    /// Add a chunk unless its id is known or the set is full. Returns
    /// whether it was added.
    pub fn insert(&mut self, chunk: DocumentChunk) -> bool {
        if self.is_full() || self.seen.contains(&chunk.id) {
            return false;
        }
        self.seen.insert(chunk.id.clone());
        self.chunks.push(chunk);
        true
    }

    /// Insert every chunk until the set fills. Returns how many were added.
    pub fn extend(
        &mut self,
        chunks: impl IntoIterator<Item = DocumentChunk>,
    ) -> usize {
        let mut added = 0;
        for chunk in chunks {
            if self.is_full() {
                break;
            }
            if self.insert(chunk) {
                added += 1;
            }
        }
        added
    }

    pub fn is_full(&self) -> bool {
        self.chunks.len() >= self.cap
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn into_vec(self) -> Vec<DocumentChunk> {
        self.chunks
    }
}

/// Runs the full-query plus phrase fan-out against one engine.
pub struct Retriever<'a, E> {
    engine: &'a E,
    config: &'a RetrievalConfig,
}

impl<'a, E: SearchEngine> Retriever<'a, E> {
    pub fn new(engine: &'a E, config: &'a RetrievalConfig) -> Self {
        Self { engine, config }
    }

    /// Retrieve unique chunks for `query` from index `uid`.
    ///
    /// Fails when the engine is unhealthy or the full-query search fails.
    /// Failed phrase searches are logged and skipped. The order of the
    /// returned chunks carries no meaning.
    pub async fn retrieve(
        &self,
        query: &str,
        uid: &str,
    ) -> Result<Vec<DocumentChunk>> {
        self.config.validate()?;
        if query.trim().is_empty() {
            return Err(Error::Config("query must not be empty".into()));
        }

        self.engine.health().await.map_err(|e| match e {
            Error::EngineUnavailable(_) => e,
            other => Error::EngineUnavailable(other.to_string()),
        })?;

        let mut results = ResultSet::new(self.config.cap);
        let initial = self
            .engine
            .search(
                uid,
                &SearchRequest::for_retrieval(query, self.config.initial_limit),
            )
            .await?;
        let added = results.extend(initial.hits.into_iter().map(|h| h.chunk));
        debug!(query, hits = added, "full-query search");

        let keywords = query_keywords(query);
        let phrases = phrase_queries(&keywords, self.config.max_phrase_words);
        let mut issued = 0;
        for phrase in &phrases {
            if results.is_full() {
                debug!(cap = self.config.cap, "result cap reached");
                break;
            }
            issued += 1;
            let request =
                SearchRequest::for_retrieval(phrase, self.config.phrase_limit);
            match self.engine.search(uid, &request).await {
                Ok(response) => {
                    let added = results
                        .extend(response.hits.into_iter().map(|h| h.chunk));
                    debug!(phrase, added, "phrase search");
                }
                Err(e) => {
                    warn!(phrase, error = %e, "phrase search failed, skipping");
                }
            }
        }

        debug!(
            query,
            keywords = keywords.len(),
            phrases = issued,
            chunks = results.len(),
            "retrieval done"
        );
        Ok(results.into_vec())
    }
}
