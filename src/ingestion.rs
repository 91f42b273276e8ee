//! Folder indexing jobs.
//!
//! A job recreates the folder's index, then streams every document through
//! parse, chunk and batched submission. Per-file failures are logged and
//! counted without stopping the job.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    chunking::{ChunkingConfig, chunk_document},
    document::DocumentChunk,
    engine::SearchEngine,
    error::{Error, Result},
    ids::folder_index_uid,
    index_writer::{BatchIndexer, IndexReport, IndexingConfig},
    parser::DocumentParser,
    walker::{DiscoveredFile, discover_files},
};

/// Cooperative cancellation flag, checked between files and batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The "indexing in progress" flag for one engine.
///
/// At most one folder job runs against an engine at a time. Clones share
/// the same flag.
#[derive(Debug, Clone, Default)]
pub struct IndexingState(Arc<Mutex<Option<PathBuf>>>);

/// Holds the indexing flag; released on drop.
#[derive(Debug)]
pub struct IndexingGuard {
    state: IndexingState,
}

impl IndexingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag for `folder`.
    pub fn try_begin(&self, folder: &Path) -> Result<IndexingGuard> {
        let mut current = self.lock();
        if let Some(active) = current.as_ref() {
            return Err(Error::IndexingInProgress(active.clone()));
        }
        *current = Some(folder.to_path_buf());
        Ok(IndexingGuard {
            state: self.clone(),
        })
    }

    /// The folder currently being indexed, if any.
    pub fn current(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        // The guarded value is a plain path; a panic elsewhere cannot leave
        // it half-written.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for IndexingGuard {
    fn drop(&mut self) {
        *self.state.lock() = None;
    }
}

/// Result of one folder job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub folder: PathBuf,
    pub index_uid: String,
    pub files_found: usize,
    /// Files whose chunks were all accepted by the engine.
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
}

/// Indexes folders into a search engine.
pub struct FolderIndexer<'a, E, P> {
    engine: &'a E,
    parser: Arc<P>,
    chunking: &'a ChunkingConfig,
    indexing: &'a IndexingConfig,
    state: &'a IndexingState,
}

impl<'a, E, P> FolderIndexer<'a, E, P>
where
    E: SearchEngine,
    P: DocumentParser + 'static,
{
    pub fn new(
        engine: &'a E,
        parser: Arc<P>,
        chunking: &'a ChunkingConfig,
        indexing: &'a IndexingConfig,
        state: &'a IndexingState,
    ) -> Self {
        Self {
            engine,
            parser,
            chunking,
            indexing,
            state,
        }
    }

    /// Rebuild the index of `folder` from scratch.
    pub async fn index_folder(
        &self,
        folder: &Path,
        cancel: &CancelToken,
    ) -> Result<IndexSummary> {
        self.chunking.validate()?;
        self.indexing.validate()?;
        let folder = resolve_folder(folder)?;
        let _guard = self.state.try_begin(&folder)?;
        let uid = folder_index_uid(&folder);

        self.engine.health().await?;
        match self.engine.delete_index(&uid).await {
            Ok(_) | Err(Error::IndexNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.engine.create_index(&uid).await?;

        let files = discover_files(&folder)?;
        info!(
            folder = %folder.display(),
            index = %uid,
            files = files.len(),
            "indexing folder"
        );

        let mut summary = IndexSummary {
            folder: folder.clone(),
            index_uid: uid.clone(),
            files_found: files.len(),
            files_indexed: 0,
            files_failed: 0,
            chunks_indexed: 0,
            chunks_failed: 0,
        };
        let mut indexer = BatchIndexer::new(self.engine, &uid, self.indexing);

        for file in &files {
            if cancel.is_cancelled() {
                info!(folder = %folder.display(), "indexing cancelled");
                return Err(Error::Cancelled);
            }

            match self.index_file(&folder, file, &mut indexer, cancel).await {
                Ok(report) => {
                    summary.chunks_indexed += report.chunks_indexed;
                    summary.chunks_failed += report.chunks_failed;
                    if report.is_complete() && report.chunks_indexed > 0 {
                        summary.files_indexed += 1;
                    } else {
                        warn!(
                            file = %file.relative_path.display(),
                            failed_chunks = report.chunks_failed,
                            "file only partially indexed"
                        );
                        summary.files_failed += 1;
                    }
                }
                // Unavailability here means the engine never recovered
                // from a failed health check.
                Err(e @ (Error::Cancelled | Error::EngineUnavailable(_))) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        file = %file.relative_path.display(),
                        error = %e,
                        "skipping file"
                    );
                    summary.files_failed += 1;
                }
            }
        }

        info!(
            folder = %folder.display(),
            files_indexed = summary.files_indexed,
            files_failed = summary.files_failed,
            chunks = summary.chunks_indexed,
            "folder indexed"
        );
        Ok(summary)
    }

    /// Parse, chunk and submit one file, flushing every
    /// `chunking.flush_every` chunks. Batches never span files.
    async fn index_file(
        &self,
        folder: &Path,
        file: &DiscoveredFile,
        indexer: &mut BatchIndexer<'_, E>,
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        let parser = Arc::clone(&self.parser);
        let path = file.absolute_path.clone();
        let doc = tokio::task::spawn_blocking(move || parser.parse(&path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        let mut report = IndexReport::default();
        let mut pending: Vec<DocumentChunk> =
            Vec::with_capacity(self.chunking.flush_every);
        for chunk in chunk_document(&doc, folder, self.chunking) {
            pending.push(chunk);
            if pending.len() >= self.chunking.flush_every {
                report.merge(indexer.submit(&pending, cancel).await?);
                pending.clear();
            }
        }
        if !pending.is_empty() {
            report.merge(indexer.submit(&pending, cancel).await?);
        }

        debug!(
            file = %file.relative_path.display(),
            pages = doc.pages.len(),
            chunks = report.chunks_indexed,
            "file indexed"
        );
        Ok(report)
    }

    /// Delete the index of `folder`.
    pub async fn remove_folder(&self, folder: &Path) -> Result<String> {
        let folder = folder.canonicalize().unwrap_or_else(|_| folder.into());
        if self.state.current().as_deref() == Some(folder.as_path()) {
            return Err(Error::IndexingInProgress(folder));
        }
        let uid = folder_index_uid(&folder);
        self.engine.delete_index(&uid).await?;
        info!(folder = %folder.display(), index = %uid, "folder removed");
        Ok(uid)
    }
}

fn resolve_folder(folder: &Path) -> Result<PathBuf> {
    match folder.canonicalize() {
        Ok(path) if path.is_dir() => Ok(path),
        Ok(path) => Err(Error::Config(format!(
            "not a folder: {}",
            path.display()
        ))),
        Err(e) => Err(Error::Config(format!(
            "cannot open folder {}: {e}",
            folder.display()
        ))),
    }
}
