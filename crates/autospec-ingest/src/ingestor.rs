//! Document ingestor: raw bytes to page-addressed chunks.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use autospec_core::config::IngestConfig;
use autospec_core::error::{AutoSpecError, Result};
use autospec_core::types::Chunk;

use crate::extract::extract_pages;
use crate::splitter::TextSplitter;

/// Pages are joined with a paragraph break so the splitter prefers to cut there.
const PAGE_SEPARATOR: &str = "\n\n";

/// Extracts page text from a document and splits it into overlapping chunks.
///
/// Has no side effects beyond returning the chunks; temporary copies of the
/// raw document are the caller's to create and delete.
#[derive(Debug, Clone)]
pub struct DocumentIngestor {
    splitter: TextSplitter,
    parse_timeout: Duration,
}

impl DocumentIngestor {
    /// Create an ingestor from the `[ingest]` config section.
    pub fn new(config: &IngestConfig) -> Result<Self> {
        Ok(Self {
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap)?,
            parse_timeout: Duration::from_secs(config.parse_timeout_secs),
        })
    }

    /// Create an ingestor with the defaults (1000 characters, 150 overlap).
    pub fn with_defaults() -> Result<Self> {
        Self::new(&IngestConfig::default())
    }

    /// Extract and chunk a document held in memory.
    ///
    /// Extraction runs on a blocking thread under the configured parse timeout.
    /// A parser panic, a timeout, or a document without text all surface as
    /// [`AutoSpecError::UnreadableDocument`].
    pub async fn ingest(&self, source: &str, bytes: Vec<u8>) -> Result<Vec<Chunk>> {
        let byte_len = bytes.len();
        let task = tokio::task::spawn_blocking(move || extract_pages(&bytes));

        let pages = match tokio::time::timeout(self.parse_timeout, task).await {
            Ok(Ok(pages)) => pages?,
            Ok(Err(e)) => {
                return Err(AutoSpecError::UnreadableDocument(format!(
                    "parser crashed on {source}: {e}"
                )))
            }
            Err(_) => {
                return Err(AutoSpecError::UnreadableDocument(format!(
                    "text extraction for {source} exceeded {}s",
                    self.parse_timeout.as_secs()
                )))
            }
        };

        debug!(source, bytes = byte_len, pages = pages.len(), "Extracted page text");
        let chunks = self.chunk_pages(source, &pages)?;
        info!(source, pages = pages.len(), chunks = chunks.len(), "Document chunked");
        Ok(chunks)
    }

    /// Read a document from disk and ingest it under its file name.
    pub async fn ingest_path(&self, path: &Path) -> Result<Vec<Chunk>> {
        let bytes = tokio::fs::read(path).await?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest(&source, bytes).await
    }

    /// Split already-extracted pages into chunks.
    ///
    /// Pages are concatenated and split as one text; each chunk is attributed
    /// to the page its first character came from.
    pub fn chunk_pages(&self, source: &str, pages: &[String]) -> Result<Vec<Chunk>> {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        let mut offset = 0usize;
        for page in pages {
            page_starts.push(offset);
            text.push_str(page);
            text.push_str(PAGE_SEPARATOR);
            offset += page.chars().count() + PAGE_SEPARATOR.len();
        }

        let chunks: Vec<Chunk> = self
            .splitter
            .split(&text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, span)| {
                let page = page_for_offset(&page_starts, span.start);
                Chunk::new(source, page as u32, ordinal as u32, span.text)
            })
            .collect();

        if chunks.is_empty() {
            return Err(AutoSpecError::UnreadableDocument(format!(
                "{source} contains no extractable text"
            )));
        }
        Ok(chunks)
    }
}

/// Index of the last page whose start offset is at or before `offset`.
fn page_for_offset(page_starts: &[usize], offset: usize) -> usize {
    page_starts
        .partition_point(|&start| start <= offset)
        .saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_ingestor() -> DocumentIngestor {
        DocumentIngestor::new(&IngestConfig {
            chunk_size: 100,
            chunk_overlap: 20,
            parse_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_page_for_offset() {
        let starts = vec![0, 10, 10, 25];
        assert_eq!(page_for_offset(&starts, 0), 0);
        assert_eq!(page_for_offset(&starts, 9), 0);
        // An empty page shares its start with the next page.
        assert_eq!(page_for_offset(&starts, 10), 2);
        assert_eq!(page_for_offset(&starts, 24), 2);
        assert_eq!(page_for_offset(&starts, 500), 3);
    }

    #[test]
    fn test_rejects_overlap_config() {
        let result = DocumentIngestor::new(&IngestConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            parse_timeout_secs: 5,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_pages_attributes_pages() {
        let ingestor = small_ingestor();
        let pages = vec![
            "Engine oil: 5W-30.".to_string(),
            "Coolant: long-life ethylene glycol.".to_string(),
            "Drain plug torque: 30 Nm.".to_string(),
        ];
        // Small pages fit in one chunk, so the chunk starts on page 0.
        let chunks = ingestor.chunk_pages("manual.txt", &pages).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 0);
        assert!(chunks[0].text.contains("30 Nm"));
    }

    #[test]
    fn test_chunk_pages_long_pages() {
        let ingestor = small_ingestor();
        let pages: Vec<String> = (0..3)
            .map(|p| format!("Page {p} text. ").repeat(20))
            .collect();
        let chunks = ingestor.chunk_pages("manual.txt", &pages).unwrap();

        let seen: std::collections::BTreeSet<u32> = chunks.iter().map(|c| c.page).collect();
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal as usize, i);
            assert_eq!(chunk.source, "manual.txt");
        }
        // Pages are non-decreasing along the document.
        assert!(chunks.windows(2).all(|w| w[0].page <= w[1].page));
    }

    #[test]
    fn test_chunk_pages_skips_blank_pages() {
        let ingestor = small_ingestor();
        let pages = vec![String::new(), "   ".to_string(), "Torque specs".to_string()];
        let chunks = ingestor.chunk_pages("manual.txt", &pages).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 2);
    }

    #[test]
    fn test_chunk_pages_no_text() {
        let ingestor = small_ingestor();
        let err = ingestor
            .chunk_pages("blank.txt", &[String::new(), " ".to_string()])
            .unwrap_err();
        assert!(matches!(err, AutoSpecError::UnreadableDocument(_)));
    }

    #[tokio::test]
    async fn test_ingest_paginated_text() {
        let ingestor = small_ingestor();
        let doc = "Oil change procedure. Remove the drain plug.\u{c}Torque the drain plug to 30 Nm.";
        let chunks = ingestor
            .ingest("service.txt", doc.as_bytes().to_vec())
            .await
            .unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.source == "service.txt"));
    }

    #[tokio::test]
    async fn test_ingest_path_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brakes.txt");
        std::fs::write(&path, "Pad thickness limit: 2 mm.\u{c}Rotor runout: 0.05 mm.").unwrap();

        let chunks = small_ingestor().ingest_path(&path).await.unwrap();
        assert_eq!(chunks[0].source, "brakes.txt");
        assert!(chunks.iter().any(|c| c.text.contains("0.05 mm")));
    }

    #[tokio::test]
    async fn test_ingest_path_missing_file() {
        let err = small_ingestor()
            .ingest_path(Path::new("/nonexistent/manual.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AutoSpecError::Io(_)));
    }

    #[tokio::test]
    async fn test_ingest_corrupt_pdf_is_unreadable() {
        let ingestor = small_ingestor();
        let err = ingestor
            .ingest("broken.pdf", b"%PDF-1.4\nthis is not really a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AutoSpecError::UnreadableDocument(_)));
    }

    #[tokio::test]
    async fn test_ingest_binary_is_unreadable() {
        let ingestor = small_ingestor();
        let err = ingestor
            .ingest("photo.png", vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0x00])
            .await
            .unwrap_err();
        assert!(matches!(err, AutoSpecError::UnreadableDocument(_)));
    }
}
