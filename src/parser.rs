//! Page text extraction.
//!
//! Parsing produces an immutable, ordered list of pages once per file; the
//! chunker only ever sees that list.

use std::path::Path;

use tracing::debug;

use crate::{
    document::{DocumentPage, ParsedDocument},
    error::{Error, ParseFailure, Result},
};

/// Form feed, the page separator in plain-text documents.
const PAGE_BREAK: char = '\u{0C}';

/// Turns a file into ordered pages of raw text.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;
}

fn failure(path: &Path, reason: ParseFailure) -> Error {
    Error::Parse {
        path: path.to_path_buf(),
        reason,
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(failure(path, ParseFailure::Missing))
    }
}

fn ensure_not_blank(doc: ParsedDocument) -> Result<ParsedDocument> {
    if doc.is_blank() {
        return Err(failure(&doc.path, ParseFailure::Empty));
    }
    Ok(doc)
}

/// PDF text extraction backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfParser;

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        ensure_exists(path)?;

        let doc = lopdf::Document::load(path).map_err(|e| {
            failure(path, ParseFailure::Corrupt(e.to_string()))
        })?;
        if doc.is_encrypted() {
            return Err(failure(path, ParseFailure::Encrypted));
        }

        let mut pages = Vec::new();
        for (page_number, _object_id) in doc.get_pages() {
            let text = match doc.extract_text(&[page_number]) {
                Ok(text) => text,
                Err(e) => {
                    // An unreadable page stays in place as an empty page so
                    // later page numbers are unaffected.
                    debug!(
                        path = %path.display(),
                        page = page_number,
                        error = %e,
                        "page text extraction failed"
                    );
                    String::new()
                }
            };
            pages.push(DocumentPage { page_number, text });
        }

        ensure_not_blank(ParsedDocument::new(path, pages))
    }
}

/// Plain-text documents. Form feeds split pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextParser;

impl TextParser {
    /// Split already-loaded text into pages.
    pub fn pages_from_str(text: &str) -> Vec<DocumentPage> {
        text.split(PAGE_BREAK)
            .enumerate()
            .map(|(i, page)| DocumentPage {
                page_number: i as u32 + 1,
                text: page.to_string(),
            })
            .collect()
    }
}

impl DocumentParser for TextParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        ensure_exists(path)?;
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            failure(path, ParseFailure::Corrupt(e.to_string()))
        })?;
        ensure_not_blank(ParsedDocument::new(
            path,
            Self::pages_from_str(&text),
        ))
    }
}

/// Dispatches on file extension to [`PdfParser`] or [`TextParser`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FileParser;

impl DocumentParser for FileParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => PdfParser.parse(path),
            "txt" => TextParser.parse(path),
            other => Err(failure(path, ParseFailure::Unsupported(other.into()))),
        }
    }
}
