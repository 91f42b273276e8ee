//! docseek - question answering over local folders of PDF and text files.
//!
//! docseek splits documents into overlapping page-tagged chunks, indexes them
//! in a full-text search engine (an HTTP engine such as
//! [Meilisearch](https://www.meilisearch.com), or an embedded
//! [Tantivy](https://github.com/quickwit-oss/tantivy) index), and answers
//! questions by retrieving chunks with the full question plus keyword phrase
//! sub-queries, reranking them lexically, and packing the best ones into a
//! token-bounded context for a language model.
//!
//! # Quick start
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use docseek::{ConfigDb, DataDir, Engine, Settings};
//! use docseek::ingestion::{CancelToken, FolderIndexer, IndexingState};
//! use docseek::parser::FileParser;
//! use docseek::search::{QueryPipeline, format_sources};
//!
//! # async fn run() -> docseek::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let config_db = ConfigDb::open(&data_dir.config_db())?;
//! let settings = Settings::resolve(&config_db)?;
//! let engine = Engine::from_config(&settings.engine, &data_dir.local_index_dir()?)?;
//!
//! let state = IndexingState::new();
//! let summary = FolderIndexer::new(
//!     &engine,
//!     Arc::new(FileParser),
//!     &settings.chunking,
//!     &settings.indexing,
//!     &state,
//! )
//! .index_folder(Path::new("papers"), &CancelToken::new())
//! .await?;
//!
//! let pipeline = QueryPipeline::new(&engine, &settings.retrieval, &settings.context);
//! let context = pipeline
//!     .retrieve_context("what limits the battery lifetime?", &summary.index_uid)
//!     .await?;
//! print!("{}", format_sources(&context));
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod config_db;
pub mod context;
pub mod data_dir;
pub mod document;
pub mod engine;
pub mod error;
pub mod ids;
pub mod index_writer;
pub mod ingestion;
pub mod keywords;
pub mod llm;
pub mod parser;
pub mod reranker;
pub mod retriever;
pub mod search;
pub mod settings;
pub mod tokenizer;
pub mod walker;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use document::{DocumentChunk, DocumentPage, ParsedDocument};
pub use engine::{Engine, SearchEngine};
pub use error::{Error, Result};
pub use settings::Settings;
