use std::path::Path;

/// Number of hex characters of the file hash used in chunk ids.
const FILE_KEY_LEN: usize = 16;

/// Number of hex characters of the folder hash used in index uids.
const FOLDER_KEY_LEN: usize = 12;

/// A stable chunk identifier derived from (file path, chunk number).
///
/// Re-indexing an unchanged file produces the same ids, so the engine
/// upserts instead of duplicating. The rendered form only uses characters
/// that search engines accept in primary keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    /// Hex prefix of the file path hash.
    pub file_key: String,
    pub chunk_number: u32,
}

impl ChunkId {
    pub fn new(file_path: &Path, chunk_number: u32) -> Self {
        Self {
            file_key: hex_key(&file_path.to_string_lossy(), FILE_KEY_LEN),
            chunk_number,
        }
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.file_key, self.chunk_number)
    }
}

/// The engine index uid for a folder.
pub fn folder_index_uid(folder: &Path) -> String {
    format!(
        "folder_{}",
        hex_key(&folder.to_string_lossy(), FOLDER_KEY_LEN)
    )
}

fn hex_key(input: &str, len: usize) -> String {
    let hash = blake3::hash(input.as_bytes());
    hash.to_hex()[..len].to_string()
}
