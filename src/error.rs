use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of characters of an engine payload kept for diagnostics.
pub const PAYLOAD_SAMPLE_CHARS: usize = 240;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("local index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("search engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("search engine returned HTTP {status} for {url}: {snippet}")]
    EngineStatus {
        status: u16,
        url: String,
        snippet: String,
    },

    #[error("malformed search engine response ({context}): {snippet}")]
    MalformedResponse { context: String, snippet: String },

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("no relevant content found for the query")]
    NoRelevantContent,

    #[error("language model not ready: {0}")]
    ModelNotReady(String),

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: ParseFailure },

    #[error("indexing already in progress for {}", .0.display())]
    IndexingInProgress(PathBuf),

    #[error("operation cancelled")]
    Cancelled,
}

/// Why a document could not be turned into pages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("file does not exist")]
    Missing,
    #[error("file is corrupt or unreadable: {0}")]
    Corrupt(String),
    #[error("file is password protected")]
    Encrypted,
    #[error("file contains no extractable text")]
    Empty,
    #[error("unsupported file type: {0}")]
    Unsupported(String),
}

impl Error {
    /// Whether an indexing call that failed with this error may be retried.
    ///
    /// Engine unavailability (connection refused, timeouts, failed health
    /// checks) and server-side or throttling statuses are transient; bad
    /// requests and undecodable payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::EngineUnavailable(_) => true,
            Error::EngineStatus { status, .. } => {
                *status >= 500 || *status == 429
            }
            _ => false,
        }
    }
}

/// Truncate an engine payload to a short sample for error messages and logs.
pub fn payload_sample(payload: &str) -> String {
    payload.chars().take(PAYLOAD_SAMPLE_CHARS).collect()
}
