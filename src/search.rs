//! The query side of the pipeline: retrieve, rerank, assemble and answer.

use serde::Serialize;
use tracing::info;

use crate::{
    context::{AssembledContext, ContextConfig, assemble},
    engine::SearchEngine,
    error::{Error, Result},
    llm::LanguageModel,
    reranker::rerank,
    retriever::{RetrievalConfig, Retriever},
};

/// Instructions given to the language model with every question.
pub const SYSTEM_PROMPT: &str = "You answer questions using only the \
provided document excerpts. Cite the source file and page of the excerpts \
you rely on. If the excerpts do not contain the answer, say that you could \
not find it in the documents.";

/// The user prompt for `question` grounded in `context`.
pub fn user_prompt(question: &str, context: &str) -> String {
    format!(
        "Document excerpts:\n\n{context}\n\n===\n\nQuestion: {question}\n\n\
         Answer using the excerpts above."
    )
}

/// Context selected for one question.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub query: String,
    pub index_uid: String,
    /// Unique chunks returned by retrieval, before packing.
    pub retrieved: usize,
    pub context: AssembledContext,
}

/// A model answer with the context it was given.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    #[serde(flatten)]
    pub context: RetrievedContext,
}

/// Query-time pipeline over one engine.
pub struct QueryPipeline<'a, E> {
    engine: &'a E,
    retrieval: &'a RetrievalConfig,
    context: &'a ContextConfig,
}

impl<'a, E: SearchEngine> QueryPipeline<'a, E> {
    pub fn new(
        engine: &'a E,
        retrieval: &'a RetrievalConfig,
        context: &'a ContextConfig,
    ) -> Self {
        Self {
            engine,
            retrieval,
            context,
        }
    }

    /// Retrieve, rerank and pack context for `query` from index `uid`.
    ///
    /// Fails with [`Error::NoRelevantContent`] when retrieval finds nothing
    /// or no chunk fits the token budget.
    pub async fn retrieve_context(
        &self,
        query: &str,
        uid: &str,
    ) -> Result<RetrievedContext> {
        self.context.validate()?;
        let chunks = Retriever::new(self.engine, self.retrieval)
            .retrieve(query, uid)
            .await?;
        if chunks.is_empty() {
            return Err(Error::NoRelevantContent);
        }

        let retrieved = chunks.len();
        let ranked = rerank(query, chunks);
        let context = assemble(&ranked, self.context);
        if context.is_empty() {
            return Err(Error::NoRelevantContent);
        }

        info!(
            index = uid,
            retrieved,
            packed = context.sources.len(),
            tokens = context.tokens_used,
            "context assembled"
        );
        Ok(RetrievedContext {
            query: query.to_string(),
            index_uid: uid.to_string(),
            retrieved,
            context,
        })
    }

    /// Answer `query` from index `uid` with `model`.
    pub async fn answer<M: LanguageModel>(
        &self,
        model: &M,
        query: &str,
        uid: &str,
    ) -> Result<Answer> {
        let context = self.retrieve_context(query, uid).await?;
        let prompt = user_prompt(query, &context.context.text);
        let answer = model.generate(SYSTEM_PROMPT, &prompt).await?;
        Ok(Answer { answer, context })
    }
}

/// Human-readable listing of the sources in a context.
pub fn format_sources(context: &RetrievedContext) -> String {
    let mut out = String::new();
    for (rank, source) in context.context.sources.iter().enumerate() {
        let page = source
            .page_number
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        out.push_str(&format!(
            "{:>3}. [{:.3}] {} p.{} #{}\n",
            rank + 1,
            source.score,
            source.file_path,
            page,
            source.chunk_number
        ));
    }
    out.push_str(&format!(
        "\n{} of {} chunk(s), ~{} tokens\n",
        context.context.sources.len(),
        context.retrieved,
        context.context.tokens_used
    ));
    out
}

/// Human-readable answer followed by its sources.
pub fn format_answer(answer: &Answer) -> String {
    format!(
        "{}\n\nSources:\n{}",
        answer.answer,
        format_sources(&answer.context)
    )
}

/// Pretty JSON for any pipeline output.
pub fn format_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
