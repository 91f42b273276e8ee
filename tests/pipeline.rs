//! Folder to answer, end to end, over the embedded engine.

use std::{fs, path::Path, sync::Arc, sync::Mutex, time::Duration};

use docseek::{
    Error,
    Result,
    SearchEngine,
    chunking::ChunkingConfig,
    context::ContextConfig,
    engine::{SearchRequest, local::LocalEngine},
    index_writer::IndexingConfig,
    ingestion::{CancelToken, FolderIndexer, IndexingState},
    llm::LanguageModel,
    parser::TextParser,
    retriever::RetrievalConfig,
    search::{QueryPipeline, SYSTEM_PROMPT},
};

const OWNERSHIP: &str = "Every value in Rust has a single owner. When the \
owner goes out of scope the value is dropped. The borrow checker enforces \
ownership rules at compile time, so references never outlive the data they \
point to. Mutable borrows are exclusive.";

const RUNTIME: &str = "An async runtime drives futures to completion. The \
tokio scheduler polls tasks on a pool of worker threads and parks them while \
they wait for I/O readiness.\u{c}Timers are kept in a hierarchical wheel so \
that sleeping tasks cost almost nothing.";

#[derive(Default)]
struct RecordingModel {
    prompts: Mutex<Vec<String>>,
}

impl LanguageModel for RecordingModel {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        assert_eq!(system, SYSTEM_PROMPT);
        self.prompts.lock().unwrap().push(user.to_string());
        Ok("Ownership is checked at compile time.".to_string())
    }
}

fn chunking() -> ChunkingConfig {
    ChunkingConfig {
        chunk_size: 120,
        overlap: 30,
        flush_every: 2,
    }
}

fn indexing() -> IndexingConfig {
    IndexingConfig {
        batch_size: 3,
        retry_backoff: Duration::ZERO,
        success_pause: Duration::ZERO,
        failure_pause: Duration::ZERO,
        health_wait_interval: Duration::ZERO,
        ..Default::default()
    }
}

fn write_corpus(root: &Path) {
    fs::write(root.join("ownership.txt"), OWNERSHIP).unwrap();
    fs::create_dir(root.join("async")).unwrap();
    fs::write(root.join("async").join("runtime.TXT"), RUNTIME).unwrap();
    fs::write(root.join("readme.md"), "not indexed").unwrap();
    fs::write(root.join(".draft.txt"), "hidden files are skipped").unwrap();
    fs::write(root.join("blank.txt"), "  \n\n ").unwrap();
}

async fn count_chunks(engine: &LocalEngine, uid: &str) -> usize {
    let response = engine
        .search(uid, &SearchRequest::new("").with_limit(0))
        .await
        .unwrap();
    response.estimated_total_hits.unwrap()
}

#[tokio::test]
async fn index_then_answer() {
    let tmp = tempfile::tempdir().unwrap();
    write_corpus(tmp.path());

    let engine = LocalEngine::in_memory();
    let (chunking, indexing) = (chunking(), indexing());
    let state = IndexingState::new();
    let indexer = FolderIndexer::new(
        &engine,
        Arc::new(TextParser),
        &chunking,
        &indexing,
        &state,
    );

    let summary = indexer
        .index_folder(tmp.path(), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(summary.files_found, 3);
    assert_eq!(summary.files_indexed, 2);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.chunks_failed, 0);
    assert!(summary.chunks_indexed >= 4);
    assert!(state.current().is_none());
    assert_eq!(
        count_chunks(&engine, &summary.index_uid).await,
        summary.chunks_indexed
    );

    let retrieval = RetrievalConfig::default();
    let context = ContextConfig::default();
    let pipeline = QueryPipeline::new(&engine, &retrieval, &context);
    let model = RecordingModel::default();

    let answer = pipeline
        .answer(
            &model,
            "How does the borrow checker enforce ownership?",
            &summary.index_uid,
        )
        .await
        .unwrap();

    assert_eq!(answer.answer, "Ownership is checked at compile time.");
    let top = &answer.context.context.sources[0];
    assert!(top.file_path.ends_with("ownership.txt"));
    assert_eq!(top.page_number, Some(1));
    assert!(answer.context.context.tokens_used <= context.token_budget);

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Question: How does the borrow checker"));
    assert!(prompts[0].contains("[Source: "));
}

#[tokio::test]
async fn second_page_is_tagged() {
    let tmp = tempfile::tempdir().unwrap();
    write_corpus(tmp.path());

    let engine = LocalEngine::in_memory();
    let (chunking, indexing) = (chunking(), indexing());
    let state = IndexingState::new();
    let summary = FolderIndexer::new(
        &engine,
        Arc::new(TextParser),
        &chunking,
        &indexing,
        &state,
    )
    .index_folder(tmp.path(), &CancelToken::new())
    .await
    .unwrap();

    let retrieval = RetrievalConfig::default();
    let context = ContextConfig::default();
    let result = QueryPipeline::new(&engine, &retrieval, &context)
        .retrieve_context("sleeping tasks cost nothing", &summary.index_uid)
        .await
        .unwrap();

    let top = &result.context.sources[0];
    assert!(top.file_path.ends_with("runtime.TXT"));
    assert_eq!(top.page_number, Some(2));
}

#[tokio::test]
async fn reindexing_replaces_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    write_corpus(tmp.path());

    let engine = LocalEngine::in_memory();
    let (chunking, indexing) = (chunking(), indexing());
    let state = IndexingState::new();
    let indexer = FolderIndexer::new(
        &engine,
        Arc::new(TextParser),
        &chunking,
        &indexing,
        &state,
    );

    let first = indexer
        .index_folder(tmp.path(), &CancelToken::new())
        .await
        .unwrap();
    fs::remove_file(tmp.path().join("async").join("runtime.TXT")).unwrap();
    let second = indexer
        .index_folder(tmp.path(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(first.index_uid, second.index_uid);
    assert!(second.chunks_indexed < first.chunks_indexed);
    assert_eq!(
        count_chunks(&engine, &second.index_uid).await,
        second.chunks_indexed
    );
}

#[tokio::test]
async fn removed_folder_cannot_be_queried() {
    let tmp = tempfile::tempdir().unwrap();
    write_corpus(tmp.path());

    let engine = LocalEngine::in_memory();
    let (chunking, indexing) = (chunking(), indexing());
    let state = IndexingState::new();
    let indexer = FolderIndexer::new(
        &engine,
        Arc::new(TextParser),
        &chunking,
        &indexing,
        &state,
    );
    let summary = indexer
        .index_folder(tmp.path(), &CancelToken::new())
        .await
        .unwrap();

    let uid = indexer.remove_folder(tmp.path()).await.unwrap();
    assert_eq!(uid, summary.index_uid);
    assert!(!engine.index_exists(&uid).await.unwrap());

    let retrieval = RetrievalConfig::default();
    let context = ContextConfig::default();
    let err = QueryPipeline::new(&engine, &retrieval, &context)
        .retrieve_context("ownership", &uid)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IndexNotFound(_)));
}

#[tokio::test]
async fn cancelled_job_stops_early() {
    let tmp = tempfile::tempdir().unwrap();
    write_corpus(tmp.path());

    let engine = LocalEngine::in_memory();
    let (chunking, indexing) = (chunking(), indexing());
    let state = IndexingState::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = FolderIndexer::new(
        &engine,
        Arc::new(TextParser),
        &chunking,
        &indexing,
        &state,
    )
    .index_folder(tmp.path(), &cancel)
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(state.current().is_none());
}
