use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Raw text of one page, as produced by a [`DocumentParser`].
///
/// [`DocumentParser`]: crate::parser::DocumentParser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    /// One-based page number.
    pub page_number: u32,
    pub text: String,
}

/// A parsed file: its ordered pages plus where it came from.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub path: PathBuf,
    pub file_name: String,
    pub pages: Vec<DocumentPage>,
}

impl ParsedDocument {
    pub fn new(path: &Path, pages: Vec<DocumentPage>) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            file_name,
            pages,
        }
    }

    /// Lowercased file extension, or an empty string.
    pub fn file_type(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    /// Whether every page is blank.
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// The unit of indexing and retrieval.
///
/// Serialized in camelCase, which is the document shape stored in the search
/// engine. Fields that searches do not always retrieve fall back to their
/// defaults when deserialized from a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub id: String,
    /// Trimmed, non-empty chunk text.
    pub content: String,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    /// Position of the chunk within its file, starting at zero.
    pub chunk_number: u32,
    /// Length of `content` in characters.
    #[serde(default)]
    pub chunk_size: usize,
    #[serde(default)]
    pub word_count: usize,
    /// Creation time in seconds since the Unix epoch.
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub file_type: String,
}

/// Attribute names of [`DocumentChunk`] as stored in the engine.
pub mod attributes {
    pub const ID: &str = "id";
    pub const CONTENT: &str = "content";
    pub const FILE_NAME: &str = "fileName";
    pub const FILE_PATH: &str = "filePath";
    pub const FOLDER_PATH: &str = "folderPath";
    pub const PAGE_NUMBER: &str = "pageNumber";
    pub const CHUNK_NUMBER: &str = "chunkNumber";
    pub const CHUNK_SIZE: &str = "chunkSize";
    pub const WORD_COUNT: &str = "wordCount";
    pub const CREATED_AT: &str = "createdAt";
    pub const FILE_TYPE: &str = "fileType";

    /// The fields a retrieval search asks the engine to return.
    pub const RETRIEVED: &[&str] = &[
        ID,
        CONTENT,
        FILE_NAME,
        FILE_PATH,
        PAGE_NUMBER,
        CHUNK_NUMBER,
        WORD_COUNT,
    ];
}

/// A single search result.
///
/// Carries the retrieved chunk fields plus the engine's optional highlighted
/// copy of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub chunk: DocumentChunk,
    #[serde(
        rename = "_formatted",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub formatted: Option<serde_json::Value>,
}

impl SearchHit {
    /// Highlighted content, when the engine returned one.
    pub fn highlighted_content(&self) -> Option<&str> {
        self.formatted
            .as_ref()?
            .get(attributes::CONTENT)?
            .as_str()
    }
}
