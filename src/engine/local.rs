//! An embedded search engine: one Tantivy index per uid.
//!
//! Indexes live in memory or in subdirectories of a root directory. The
//! whole chunk is stored as a JSON payload next to the indexed `content`
//! field, so hits come back with every attribute. Searches support `q`,
//! `limit`, `offset` and content highlighting; `filter`, `sort` and
//! `facets` are ignored.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use serde_json::json;
use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    TantivyDocument,
    Term,
    collector::{Count, TopDocs},
    doc,
    query::{AllQuery, Query, QueryParser},
    schema::*,
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
};
use tracing::debug;

use super::{SearchEngine, SearchRequest, SearchResponse, TaskInfo};
use crate::{
    document::{DocumentChunk, SearchHit, attributes},
    error::{Error, Result},
    tokenizer::is_token_char,
};

/// Analyzer for chunk content. No stemming: the pipeline is purely lexical.
const CONTENT_TOKENIZER: &str = "docseek_plain";

const WRITER_MEMORY_BYTES: usize = 50_000_000;

mod fields {
    pub const ID: &str = "id";
    pub const CONTENT: &str = "content";
    pub const PAYLOAD: &str = "payload";
}

#[derive(Clone, Copy)]
struct SchemaFields {
    id: Field,
    content: Field,
    payload: Field,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let id = builder.add_text_field(fields::ID, STRING | STORED);
    let content_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(CONTENT_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let content = builder.add_text_field(fields::CONTENT, content_opts);
    let payload = builder.add_text_field(fields::PAYLOAD, STORED);

    (builder.build(), SchemaFields {
        id,
        content,
        payload,
    })
}

fn register_tokenizers(index: &Index) {
    let plain = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(CONTENT_TOKENIZER, plain);
}

/// One open index.
struct LocalIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: SchemaFields,
}

impl LocalIndex {
    fn from_index(index: Index) -> Result<Self> {
        register_tokenizers(&index);
        let (_, fields) = build_schema();
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    fn in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        Self::from_index(Index::create_in_ram(schema))
    }

    fn open_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, _) = build_schema();
        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };
        Self::from_index(index)
    }

    fn upsert(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let f = self.fields;
        let mut writer = self.writer.lock().map_err(|_| {
            Error::EngineUnavailable("local index writer poisoned".into())
        })?;
        for chunk in chunks {
            let payload = serde_json::to_string(chunk)?;
            writer.delete_term(Term::from_field_text(f.id, &chunk.id));
            writer.add_document(doc!(
                f.id => chunk.id.as_str(),
                f.content => chunk.content.as_str(),
                f.payload => payload,
            ))?;
        }
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let f = self.fields;
        let searcher = self.reader.searcher();

        let query: Box<dyn Query> = if request.q.trim().is_empty() {
            Box::new(AllQuery)
        } else {
            let parser = QueryParser::for_index(&self.index, vec![f.content]);
            let (query, errors) = parser.parse_query_lenient(&request.q);
            if !errors.is_empty() {
                debug!(q = %request.q, ?errors, "lenient query parse");
            }
            query
        };

        let limit = request.limit.unwrap_or(20);
        let offset = request.offset.unwrap_or(0);
        let (top_docs, total) = if limit == 0 {
            (Vec::new(), searcher.search(&*query, &Count)?)
        } else {
            searcher.search(
                &*query,
                &(TopDocs::with_limit(limit).and_offset(offset), Count),
            )?
        };

        let highlight = request
            .attributes_to_highlight
            .as_ref()
            .is_some_and(|attrs| {
                attrs.iter().any(|a| a == attributes::CONTENT || a == "*")
            });
        let terms = query_terms(&request.q);
        let pre = request.highlight_pre_tag.as_deref().unwrap_or("<em>");
        let post = request.highlight_post_tag.as_deref().unwrap_or("</em>");

        let mut hits = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let payload = doc
                .get_first(f.payload)
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let chunk: DocumentChunk =
                serde_json::from_str(payload).map_err(|e| {
                    Error::MalformedResponse {
                        context: format!("local payload: {e}"),
                        snippet: crate::error::payload_sample(payload),
                    }
                })?;
            let formatted = highlight.then(|| {
                json!({
                    attributes::CONTENT:
                        highlight_terms(&chunk.content, &terms, pre, post)
                })
            });
            hits.push(SearchHit { chunk, formatted });
        }

        Ok(SearchResponse {
            hits,
            query: request.q.clone(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            limit: Some(limit),
            offset: Some(offset),
            estimated_total_hits: Some(total),
        })
    }
}

/// Lowercased word runs of a query, for highlighting.
fn query_terms(q: &str) -> Vec<String> {
    q.split(|c: char| !is_token_char(c))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Wrap every word of `text` that matches a query term in the given tags.
fn highlight_terms(
    text: &str,
    terms: &[String],
    pre: &str,
    post: &str,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start: Option<usize> = None;

    let flush = |out: &mut String, word: &str| {
        if terms.iter().any(|t| *t == word.to_lowercase()) {
            out.push_str(pre);
            out.push_str(word);
            out.push_str(post);
        } else {
            out.push_str(word);
        }
    };

    for (i, c) in text.char_indices() {
        if is_token_char(c) {
            word_start.get_or_insert(i);
        } else {
            if let Some(start) = word_start.take() {
                flush(&mut out, &text[start..i]);
            }
            out.push(c);
        }
    }
    if let Some(start) = word_start {
        flush(&mut out, &text[start..]);
    }
    out
}

/// Open indexes, keyed by uid.
struct Catalog {
    /// On-disk root; `None` keeps every index in memory.
    root: Option<PathBuf>,
    indexes: Mutex<HashMap<String, Arc<LocalIndex>>>,
}

impl Catalog {
    fn index_dir(&self, uid: &str) -> Result<Option<PathBuf>> {
        let valid = !uid.is_empty()
            && uid
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::Config(format!("invalid index uid '{uid}'")));
        }
        Ok(self.root.as_ref().map(|root| root.join(uid)))
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<LocalIndex>>>>
    {
        self.indexes
            .lock()
            .map_err(|_| Error::EngineUnavailable("local engine poisoned".into()))
    }

    /// The open index for `uid`, loading it from disk if needed.
    fn get(&self, uid: &str) -> Result<Arc<LocalIndex>> {
        let dir = self.index_dir(uid)?;
        let mut indexes = self.lock()?;
        if let Some(index) = indexes.get(uid) {
            return Ok(Arc::clone(index));
        }
        match dir {
            Some(dir) if dir.is_dir() => {
                let index = Arc::new(LocalIndex::open_or_create(&dir)?);
                indexes.insert(uid.to_string(), Arc::clone(&index));
                Ok(index)
            }
            _ => Err(Error::IndexNotFound(uid.to_string())),
        }
    }

    fn create(&self, uid: &str) -> Result<()> {
        let dir = self.index_dir(uid)?;
        let mut indexes = self.lock()?;
        if !indexes.contains_key(uid) {
            let index = match dir {
                Some(dir) => LocalIndex::open_or_create(&dir)?,
                None => LocalIndex::in_ram()?,
            };
            indexes.insert(uid.to_string(), Arc::new(index));
        }
        Ok(())
    }

    fn delete(&self, uid: &str) -> Result<()> {
        let dir = self.index_dir(uid)?;
        let removed = self.lock()?.remove(uid).is_some();
        let on_disk = match &dir {
            Some(dir) if dir.is_dir() => {
                std::fs::remove_dir_all(dir)?;
                true
            }
            _ => false,
        };
        if !removed && !on_disk {
            return Err(Error::IndexNotFound(uid.to_string()));
        }
        Ok(())
    }
}

/// Run Tantivy and filesystem work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

/// Tantivy-backed [`SearchEngine`].
pub struct LocalEngine {
    catalog: Arc<Catalog>,
    next_task: AtomicU64,
}

impl LocalEngine {
    /// An engine whose indexes vanish when it is dropped.
    pub fn in_memory() -> Self {
        Self::with_root(None)
    }

    /// An engine persisting each index under `root/<uid>`.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self::with_root(Some(root.to_path_buf())))
    }

    fn with_root(root: Option<PathBuf>) -> Self {
        Self {
            catalog: Arc::new(Catalog {
                root,
                indexes: Mutex::new(HashMap::new()),
            }),
            next_task: AtomicU64::new(0),
        }
    }

    fn task(&self, uid: &str, kind: &str) -> TaskInfo {
        TaskInfo {
            task_uid: self.next_task.fetch_add(1, Ordering::Relaxed),
            index_uid: Some(uid.to_string()),
            status: "succeeded".into(),
            kind: kind.to_string(),
            enqueued_at: None,
        }
    }

    async fn open_index(&self, uid: &str) -> Result<Arc<LocalIndex>> {
        let catalog = Arc::clone(&self.catalog);
        let uid = uid.to_string();
        blocking(move || catalog.get(&uid)).await
    }
}

impl SearchEngine for LocalEngine {
    async fn health(&self) -> Result<()> {
        Ok(())
    }

    async fn create_index(&self, uid: &str) -> Result<TaskInfo> {
        let catalog = Arc::clone(&self.catalog);
        let owned = uid.to_string();
        blocking(move || catalog.create(&owned)).await?;
        Ok(self.task(uid, "indexCreation"))
    }

    async fn delete_index(&self, uid: &str) -> Result<TaskInfo> {
        let catalog = Arc::clone(&self.catalog);
        let owned = uid.to_string();
        blocking(move || catalog.delete(&owned)).await?;
        Ok(self.task(uid, "indexDeletion"))
    }

    async fn index_exists(&self, uid: &str) -> Result<bool> {
        match self.open_index(uid).await {
            Ok(_) => Ok(true),
            Err(Error::IndexNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn add_documents(
        &self,
        uid: &str,
        chunks: &[DocumentChunk],
    ) -> Result<TaskInfo> {
        let index = self.open_index(uid).await?;
        let chunks = chunks.to_vec();
        blocking(move || index.upsert(&chunks)).await?;
        Ok(self.task(uid, "documentAdditionOrUpdate"))
    }

    async fn search(
        &self,
        uid: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let index = self.open_index(uid).await?;
        let request = request.clone();
        blocking(move || index.search(&request)).await
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("root", &self.catalog.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::chunk;

    fn numbered(id: &str, n: u32, content: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_number: n,
            ..chunk(id, content)
        }
    }

    #[tokio::test]
    async fn create_add_and_search() {
        let engine = LocalEngine::in_memory();
        engine.create_index("folder_a").await.unwrap();
        engine
            .add_documents("folder_a", &[
                numbered("a-0", 0, "The borrow checker enforces ownership"),
                numbered("a-1", 1, "Tokio runs async tasks"),
            ])
            .await
            .unwrap();

        let response = engine
            .search("folder_a", &SearchRequest::for_retrieval("borrow", 10))
            .await
            .unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].chunk.id, "a-0");
        assert_eq!(response.estimated_total_hits, Some(1));
        assert_eq!(
            response.hits[0].highlighted_content(),
            Some("The <mark>borrow</mark> checker enforces ownership")
        );
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let engine = LocalEngine::in_memory();
        engine.create_index("folder_a").await.unwrap();
        engine
            .add_documents("folder_a", &[chunk("x-0", "old words here")])
            .await
            .unwrap();
        engine
            .add_documents("folder_a", &[chunk("x-0", "new words here")])
            .await
            .unwrap();

        let response = engine
            .search("folder_a", &SearchRequest::new("words").with_limit(10))
            .await
            .unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].chunk.content, "new words here");
    }

    #[tokio::test]
    async fn missing_index_is_typed() {
        let engine = LocalEngine::in_memory();
        assert!(!engine.index_exists("folder_nope").await.unwrap());
        assert!(matches!(
            engine.search("folder_nope", &SearchRequest::new("q")).await,
            Err(Error::IndexNotFound(_))
        ));
        assert!(matches!(
            engine.delete_index("folder_nope").await,
            Err(Error::IndexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn limit_and_offset_page_results() {
        let engine = LocalEngine::in_memory();
        engine.create_index("folder_p").await.unwrap();
        let chunks: Vec<_> = (0..5)
            .map(|i| numbered(&format!("p-{i}"), i, "shared term"))
            .collect();
        engine.add_documents("folder_p", &chunks).await.unwrap();

        let first = engine
            .search(
                "folder_p",
                &SearchRequest::new("shared").with_limit(2),
            )
            .await
            .unwrap();
        let rest = engine
            .search(
                "folder_p",
                &SearchRequest::new("shared").with_limit(10).with_offset(2),
            )
            .await
            .unwrap();
        assert_eq!(first.hits.len(), 2);
        assert_eq!(rest.hits.len(), 3);
        assert_eq!(rest.estimated_total_hits, Some(5));
    }

    #[tokio::test]
    async fn on_disk_indexes_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let engine = LocalEngine::open(tmp.path()).unwrap();
            engine.create_index("folder_d").await.unwrap();
            engine
                .add_documents("folder_d", &[chunk("d-0", "persistent text")])
                .await
                .unwrap();
        }

        let engine = LocalEngine::open(tmp.path()).unwrap();
        assert!(engine.index_exists("folder_d").await.unwrap());
        let response = engine
            .search("folder_d", &SearchRequest::new("persistent"))
            .await
            .unwrap();
        assert_eq!(response.hits.len(), 1);

        engine.delete_index("folder_d").await.unwrap();
        assert!(!tmp.path().join("folder_d").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn indexes_serve_concurrent_tasks() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(LocalEngine::open(tmp.path()).unwrap());

        let mut tasks = Vec::new();
        for uid in ["folder_m", "folder_n"] {
            let engine = Arc::clone(&engine);
            tasks.push(tokio::spawn(async move {
                engine.create_index(uid).await?;
                engine
                    .add_documents(uid, &[chunk(&format!("{uid}-0"), "shared words")])
                    .await?;
                engine.search(uid, &SearchRequest::new("shared")).await
            }));
        }

        for (task, uid) in tasks.into_iter().zip(["folder_m", "folder_n"]) {
            let response = task.await.unwrap().unwrap();
            assert_eq!(response.hits.len(), 1);
            assert_eq!(response.hits[0].chunk.id, format!("{uid}-0"));
        }
        assert!(tmp.path().join("folder_m").is_dir());
    }

    #[tokio::test]
    async fn rejects_path_like_uids() {
        let engine = LocalEngine::in_memory();
        assert!(matches!(
            engine.create_index("../escape").await,
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn highlight_wraps_whole_words_only() {
        let terms = query_terms("Rust async?");
        assert_eq!(
            highlight_terms("Rust, rusty and ASYNC.", &terms, "[", "]"),
            "[Rust], rusty and [ASYNC]."
        );
    }
}
