//! AutoSpec ingestion crate - page extraction and overlapping chunking.
//!
//! Turns raw manual bytes into page-addressed [`Chunk`](autospec_core::Chunk)s
//! ready for embedding. PDFs are read through `pdf-extract`; plain text with
//! form-feed page breaks is accepted as well.

pub mod extract;
pub mod ingestor;
pub mod splitter;

pub use extract::{detect_format, extract_pages, DocumentFormat};
pub use ingestor::DocumentIngestor;
pub use splitter::{Span, TextSplitter};
