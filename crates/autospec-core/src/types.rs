use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Newtype Wrappers - Identity
// =============================================================================

/// Unique identifier for an indexed chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub Uuid);

impl ChunkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Entity Structs
// =============================================================================

/// A contiguous span of extracted text with provenance.
///
/// Immutable once created. `page` is 0-based; a chunk that crosses a page
/// boundary carries the page its first character was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    /// Name of the document the chunk was cut from.
    pub source: String,
    /// 0-based page index in the source document.
    pub page: u32,
    /// Sequential position of the chunk within its document.
    pub ordinal: u32,
    pub text: String,
}

impl Chunk {
    pub fn new(source: impl Into<String>, page: u32, ordinal: u32, text: impl Into<String>) -> Self {
        Self {
            id: ChunkId::new(),
            source: source.into(),
            page,
            ordinal,
            text: text.into(),
        }
    }

    /// Page number as shown to a reader (1-based).
    pub fn display_page(&self) -> u32 {
        self.page + 1
    }
}

/// One question/answer exchange, in the order asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub answered_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            answered_at: Utc::now(),
        }
    }
}

/// A retrieved chunk attached to an answer as supporting evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub chunk_id: ChunkId,
    pub text: String,
    pub source: String,
    /// 1-based page number for display.
    pub page_number: u32,
}

impl From<&Chunk> for Evidence {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id,
            text: chunk.text.clone(),
            source: chunk.source.clone(),
            page_number: chunk.display_page(),
        }
    }
}

/// Output of one answered question. Transient; consumed by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    /// Retrieved chunks in similarity order.
    pub evidence: Vec<Evidence>,
    /// The self-contained query retrieval actually ran on.
    pub standalone_query: String,
}

/// Display-ready citation returned to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text_excerpt: String,
    pub source: String,
    /// 1-based page number.
    pub page_number: u32,
}

/// Response shape handed to the presentation layer by `get_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub answer: String,
    pub source_documents: Vec<SourceDocument>,
}

impl SessionResponse {
    /// Build the display response, truncating each excerpt to `excerpt_chars`.
    pub fn from_answer(result: &AnswerResult, excerpt_chars: usize) -> Self {
        Self {
            answer: result.answer.clone(),
            source_documents: result
                .evidence
                .iter()
                .map(|e| SourceDocument {
                    text_excerpt: excerpt(&e.text, excerpt_chars),
                    source: e.source.clone(),
                    page_number: e.page_number,
                })
                .collect(),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, appending `...` when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
