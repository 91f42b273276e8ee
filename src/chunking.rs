//! Cross-page chunking of parsed documents into overlapping windows.
//!
//! The non-empty pages of a document are treated as one continuous stream
//! of characters. A window grows until it holds `chunk_size` characters,
//! pulling from as many pages as it needs, and is then emitted. The next
//! window is seeded with the last `overlap` characters of the previous one.
//!
//! A "character" is one Unicode scalar value (`char`) everywhere in this
//! module, so windows never split a multi-byte sequence.
//!
//! Each window is tagged with the page on which its text begins. For a
//! continuation window that is the page where the carried-over overlap
//! starts, found by walking back through earlier pages.

use std::{path::Path, time::SystemTime};

use crate::{
    document::{DocumentChunk, DocumentPage, ParsedDocument},
    error::{Error, Result},
    ids::ChunkId,
};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default number of chunks accumulated before they are flushed to the
/// index writer.
pub const DEFAULT_FLUSH_EVERY: usize = 64;

/// Chunking settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Target window size in characters.
    pub chunk_size: usize,
    /// Characters carried from one window into the next.
    pub overlap: usize,
    /// Chunks buffered per file before a flush.
    pub flush_every: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }
}

impl ChunkingConfig {
    /// Reject settings under which chunking cannot make progress.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.flush_every == 0 {
            return Err(Error::Config(
                "chunk flush size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// One raw window of document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub text: String,
    /// Number of characters in `text`.
    pub char_len: usize,
    /// Page on which `text` begins.
    pub page_number: u32,
    /// Character offset of the first character within that page.
    pub page_offset: usize,
}

/// A non-empty page, pre-indexed for character slicing.
struct PageSpan<'a> {
    page_number: u32,
    text: &'a str,
    /// Byte offset of every character, plus the text length at the end.
    char_to_byte: Vec<usize>,
}

impl<'a> PageSpan<'a> {
    fn new(page: &'a DocumentPage) -> Self {
        let char_to_byte = page
            .text
            .char_indices()
            .map(|(byte_idx, _)| byte_idx)
            .chain(std::iter::once(page.text.len()))
            .collect();
        Self {
            page_number: page.page_number,
            text: &page.text,
            char_to_byte,
        }
    }

    fn char_len(&self) -> usize {
        self.char_to_byte.len() - 1
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.char_to_byte[start]..self.char_to_byte[end]]
    }
}

/// A position in the page stream: (span index, character offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    span: usize,
    offset: usize,
}

/// Iterator over the windows of a page list.
///
/// Produces windows lazily so callers can flush them in batches instead of
/// holding a whole file's chunks.
pub struct PageWindows<'a> {
    spans: Vec<PageSpan<'a>>,
    chunk_size: usize,
    overlap: usize,
    /// Next unread character.
    cursor: Cursor,
    /// Carried-over text for the next window and where it starts.
    carry: Option<(String, usize, Cursor)>,
    done: bool,
}

impl<'a> PageWindows<'a> {
    /// Window `pages` with the given sizes.
    ///
    /// Pages whose text is blank are skipped and never anchor a window.
    /// `overlap` must be smaller than `chunk_size`; see
    /// [`ChunkingConfig::validate`].
    pub fn new(
        pages: &'a [DocumentPage],
        chunk_size: usize,
        overlap: usize,
    ) -> Self {
        let spans: Vec<PageSpan<'a>> = pages
            .iter()
            .filter(|p| !p.text.trim().is_empty())
            .map(PageSpan::new)
            .collect();
        let done = spans.is_empty() || chunk_size == 0;
        Self {
            spans,
            chunk_size,
            overlap: overlap.min(chunk_size.saturating_sub(1)),
            cursor: Cursor { span: 0, offset: 0 },
            carry: None,
            done,
        }
    }

    fn at_end(&self) -> bool {
        self.cursor.span >= self.spans.len()
    }

    /// Move the cursor `count` characters back, stopping at the start of
    /// the document.
    fn rewind(&self, mut count: usize) -> Cursor {
        let mut span = self.cursor.span;
        let mut offset = self.cursor.offset;
        if span >= self.spans.len() {
            span = self.spans.len() - 1;
            offset = self.spans[span].char_len();
        }
        loop {
            if offset >= count {
                return Cursor {
                    span,
                    offset: offset - count,
                };
            }
            count -= offset;
            if span == 0 {
                return Cursor { span: 0, offset: 0 };
            }
            span -= 1;
            offset = self.spans[span].char_len();
        }
    }
}

impl Iterator for PageWindows<'_> {
    type Item = TextWindow;

    fn next(&mut self) -> Option<TextWindow> {
        if self.done {
            return None;
        }

        let (mut buffer, mut len, start) = match self.carry.take() {
            Some(carry) => carry,
            None => (String::new(), 0, self.cursor),
        };

        while len < self.chunk_size && !self.at_end() {
            let span = &self.spans[self.cursor.span];
            let available = span.char_len() - self.cursor.offset;
            let take = available.min(self.chunk_size - len);
            buffer.push_str(
                span.slice(self.cursor.offset, self.cursor.offset + take),
            );
            len += take;
            self.cursor.offset += take;
            if self.cursor.offset == span.char_len() {
                self.cursor = Cursor {
                    span: self.cursor.span + 1,
                    offset: 0,
                };
            }
        }

        if len == 0 {
            self.done = true;
            return None;
        }

        let start_span = &self.spans[start.span];
        let window = TextWindow {
            page_number: start_span.page_number,
            page_offset: start.offset,
            char_len: len,
            text: buffer,
        };

        // A short window, or a full one with nothing left to read, ends the
        // document: seeding an overlap would only repeat emitted text.
        if len < self.chunk_size || self.at_end() {
            self.done = true;
            return Some(window);
        }

        if self.overlap > 0 && len >= self.overlap {
            let tail_start = window
                .text
                .char_indices()
                .nth(len - self.overlap)
                .map(|(byte_idx, _)| byte_idx)
                .unwrap_or(window.text.len());
            let tail = window.text[tail_start..].to_string();
            self.carry = Some((tail, self.overlap, self.rewind(self.overlap)));
        }

        Some(window)
    }
}

/// Window a page list with the given config.
pub fn window_pages<'a>(
    pages: &'a [DocumentPage],
    config: &ChunkingConfig,
) -> PageWindows<'a> {
    PageWindows::new(pages, config.chunk_size, config.overlap)
}

/// Iterator turning the windows of one document into [`DocumentChunk`]s.
///
/// Window text is trimmed; windows that are blank after trimming are
/// dropped without consuming a chunk number.
pub struct DocumentChunks<'a> {
    windows: PageWindows<'a>,
    doc: &'a ParsedDocument,
    file_path: String,
    folder_path: String,
    file_type: String,
    created_at: u64,
    next_number: u32,
}

impl Iterator for DocumentChunks<'_> {
    type Item = DocumentChunk;

    fn next(&mut self) -> Option<DocumentChunk> {
        for window in self.windows.by_ref() {
            let content = window.text.trim();
            if content.is_empty() {
                continue;
            }

            let chunk_number = self.next_number;
            self.next_number += 1;
            return Some(DocumentChunk {
                id: ChunkId::new(&self.doc.path, chunk_number).to_string(),
                content: content.to_string(),
                file_name: self.doc.file_name.clone(),
                file_path: self.file_path.clone(),
                folder_path: self.folder_path.clone(),
                page_number: Some(window.page_number),
                chunk_number,
                chunk_size: content.chars().count(),
                word_count: content.split_whitespace().count(),
                created_at: self.created_at,
                file_type: self.file_type.clone(),
            });
        }
        None
    }
}

/// Chunk a parsed document that lives under `folder`.
///
/// Chunks come out in page order with `chunk_number` counting up from 0.
///
/// # Examples
///
/// ```
/// use std::path::Path;
///
/// use docseek::chunking::{ChunkingConfig, chunk_document};
/// use docseek::document::{DocumentPage, ParsedDocument};
///
/// let doc = ParsedDocument::new(
///     Path::new("/docs/a.txt"),
///     vec![DocumentPage { page_number: 1, text: "word ".repeat(300) }],
/// );
/// let config = ChunkingConfig { chunk_size: 1000, overlap: 200, flush_every: 64 };
/// let chunks: Vec<_> = chunk_document(&doc, Path::new("/docs"), &config).collect();
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[0].chunk_number, 0);
/// assert_eq!(chunks[1].chunk_number, 1);
/// ```
pub fn chunk_document<'a>(
    doc: &'a ParsedDocument,
    folder: &Path,
    config: &ChunkingConfig,
) -> DocumentChunks<'a> {
    let created_at = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    DocumentChunks {
        windows: window_pages(&doc.pages, config),
        doc,
        file_path: doc.path.to_string_lossy().into_owned(),
        folder_path: folder.to_string_lossy().into_owned(),
        file_type: doc.file_type(),
        created_at,
        next_number: 0,
    }
}
