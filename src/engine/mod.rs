//! Full-text search engine clients.
//!
//! The retrieval core talks to the engine only through [`SearchEngine`]:
//! create and delete an index, upsert a batch of chunks and run a search.
//! Two backends exist. [`HttpEngine`] speaks the engine's HTTP API and
//! [`LocalEngine`] embeds a Tantivy index per uid. [`Engine`] picks one at
//! runtime.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
    document::{DocumentChunk, SearchHit, attributes},
    error::Result,
};

pub mod http;
pub mod local;

pub use http::{EngineBackend, EngineConfig, HttpEngine};
pub use local::LocalEngine;

/// Operations the retrieval core needs from a search engine.
///
/// Mutating calls are asynchronous on the engine side and return a task
/// handle; the core never waits on those tasks.
pub trait SearchEngine: Send + Sync {
    /// Succeeds when the engine is reachable and healthy.
    fn health(&self) -> impl Future<Output = Result<()>> + Send;

    fn create_index(
        &self,
        uid: &str,
    ) -> impl Future<Output = Result<TaskInfo>> + Send;

    /// Fails with [`Error::IndexNotFound`] when `uid` does not exist.
    ///
    /// [`Error::IndexNotFound`]: crate::Error::IndexNotFound
    fn delete_index(
        &self,
        uid: &str,
    ) -> impl Future<Output = Result<TaskInfo>> + Send;

    fn index_exists(
        &self,
        uid: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Upsert chunks by `id`.
    fn add_documents(
        &self,
        uid: &str,
        chunks: &[DocumentChunk],
    ) -> impl Future<Output = Result<TaskInfo>> + Send;

    fn search(
        &self,
        uid: &str,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<SearchResponse>> + Send;
}

/// Body of a search call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub q: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes_to_retrieve: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes_to_highlight: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_pre_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_post_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Default::default()
        }
    }

    /// A request returning `limit` chunks with the retrieval attributes and
    /// highlighted content.
    pub fn for_retrieval(q: impl Into<String>, limit: usize) -> Self {
        Self::new(q)
            .with_limit(limit)
            .with_attributes(attributes::RETRIEVED)
            .with_highlight(&[attributes::CONTENT], "<mark>", "</mark>")
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[cfg(test)]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_attributes(mut self, attrs: &[&str]) -> Self {
        self.attributes_to_retrieve =
            Some(attrs.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn with_highlight(
        mut self,
        attrs: &[&str],
        pre_tag: &str,
        post_tag: &str,
    ) -> Self {
        self.attributes_to_highlight =
            Some(attrs.iter().map(|a| a.to_string()).collect());
        self.highlight_pre_tag = Some(pre_tag.to_string());
        self.highlight_post_tag = Some(post_tag.to_string());
        self
    }
}

/// Ranked hits of one search call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub estimated_total_hits: Option<usize>,
}

/// Handle of an enqueued engine task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_uid: u64,
    #[serde(default)]
    pub index_uid: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub enqueued_at: Option<String>,
}

/// A search engine chosen at runtime.
pub enum Engine {
    Http(HttpEngine),
    Local(LocalEngine),
}

impl Engine {
    /// Build the backend named by `config`. The local backend keeps its
    /// indexes under `local_dir`.
    pub fn from_config(
        config: &EngineConfig,
        local_dir: &std::path::Path,
    ) -> Result<Self> {
        match config.backend {
            EngineBackend::Http => Ok(Engine::Http(HttpEngine::new(config)?)),
            EngineBackend::Local => {
                Ok(Engine::Local(LocalEngine::open(local_dir)?))
            }
        }
    }
}

impl SearchEngine for Engine {
    async fn health(&self) -> Result<()> {
        match self {
            Engine::Http(e) => e.health().await,
            Engine::Local(e) => e.health().await,
        }
    }

    async fn create_index(&self, uid: &str) -> Result<TaskInfo> {
        match self {
            Engine::Http(e) => e.create_index(uid).await,
            Engine::Local(e) => e.create_index(uid).await,
        }
    }

    async fn delete_index(&self, uid: &str) -> Result<TaskInfo> {
        match self {
            Engine::Http(e) => e.delete_index(uid).await,
            Engine::Local(e) => e.delete_index(uid).await,
        }
    }

    async fn index_exists(&self, uid: &str) -> Result<bool> {
        match self {
            Engine::Http(e) => e.index_exists(uid).await,
            Engine::Local(e) => e.index_exists(uid).await,
        }
    }

    async fn add_documents(
        &self,
        uid: &str,
        chunks: &[DocumentChunk],
    ) -> Result<TaskInfo> {
        match self {
            Engine::Http(e) => e.add_documents(uid, chunks).await,
            Engine::Local(e) => e.add_documents(uid, chunks).await,
        }
    }

    async fn search(
        &self,
        uid: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        match self {
            Engine::Http(e) => e.search(uid, request).await,
            Engine::Local(e) => e.search(uid, request).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn retrieval_request_serializes_engine_fields() {
        let request = SearchRequest::for_retrieval("borrow checker", 30);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["q"], "borrow checker");
        assert_eq!(value["limit"], 30);
        assert_eq!(value["attributesToRetrieve"][0], "id");
        assert_eq!(value["attributesToHighlight"], json!(["content"]));
        assert_eq!(value["highlightPreTag"], "<mark>");
        assert!(value.get("filter").is_none());
        assert!(value.get("offset").is_none());
    }

    #[test]
    fn response_decodes_engine_shape() {
        let response: SearchResponse = serde_json::from_value(json!({
            "hits": [{
                "id": "k-0",
                "content": "text",
                "fileName": "a.pdf",
                "filePath": "/a.pdf",
                "chunkNumber": 0
            }],
            "query": "text",
            "processingTimeMs": 2,
            "limit": 30,
            "offset": 0,
            "estimatedTotalHits": 1
        }))
        .unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.estimated_total_hits, Some(1));
    }

    #[test]
    fn task_info_decodes_type_field() {
        let task: TaskInfo = serde_json::from_value(json!({
            "taskUid": 7,
            "indexUid": "folder_abc",
            "status": "enqueued",
            "type": "documentAdditionOrUpdate",
            "enqueuedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(task.task_uid, 7);
        assert_eq!(task.kind, "documentAdditionOrUpdate");
    }
}
