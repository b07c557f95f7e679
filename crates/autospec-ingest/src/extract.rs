//! Page-addressed text extraction.
//!
//! - PDF input (`%PDF-` magic) is handed to `pdf-extract`, one string per page.
//! - UTF-8 text is treated as a paginated document whose pages are separated
//!   by form feed (`\x0c`), the layout `pdftotext` writes.

use autospec_core::error::{AutoSpecError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";
const FORM_FEED: char = '\u{c}';

/// Recognised document encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PaginatedText,
}

/// Sniff the document format from its leading bytes.
pub fn detect_format(bytes: &[u8]) -> Result<DocumentFormat> {
    if bytes.is_empty() {
        return Err(AutoSpecError::UnreadableDocument(
            "document is empty".to_string(),
        ));
    }
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(DocumentFormat::Pdf);
    }
    // NUL bytes never appear in text a person would upload as a manual.
    if bytes.contains(&0) || std::str::from_utf8(bytes).is_err() {
        return Err(AutoSpecError::UnreadableDocument(
            "unsupported format: expected a PDF or UTF-8 paginated text".to_string(),
        ));
    }
    Ok(DocumentFormat::PaginatedText)
}

/// Extract the text of every page, in page order.
///
/// Page `i` of the result is page `i` (0-based) of the document. Pages without
/// text are kept as empty strings so numbering stays aligned with the source.
/// Fails if the document cannot be parsed or holds no extractable text.
///
/// This is CPU-bound and may take seconds for large PDFs; async callers should
/// run it on a blocking thread.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let pages = match detect_format(bytes)? {
        DocumentFormat::Pdf => pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| AutoSpecError::UnreadableDocument(format!("PDF parse failed: {e}")))?,
        DocumentFormat::PaginatedText => {
            // detect_format already validated UTF-8.
            let text = String::from_utf8_lossy(bytes);
            split_form_feed_pages(&text)
        }
    };

    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(AutoSpecError::UnreadableDocument(
            "no extractable text (image-only or encrypted document?)".to_string(),
        ));
    }

    Ok(pages)
}

fn split_form_feed_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(FORM_FEED).map(str::to_string).collect();
    // pdftotext terminates every page with a form feed.
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}
