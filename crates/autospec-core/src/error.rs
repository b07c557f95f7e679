use thiserror::Error;

/// Top-level error type for the AutoSpec system.
///
/// The four session-level failures a caller reacts to are
/// [`UnreadableDocument`](AutoSpecError::UnreadableDocument),
/// [`Embedding`](AutoSpecError::Embedding),
/// [`NoKnowledgeBase`](AutoSpecError::NoKnowledgeBase) and
/// [`Generation`](AutoSpecError::Generation). None of them leave the vector
/// index or the conversation memory in a partially updated state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AutoSpecError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Unreadable document: {0}")]
    UnreadableDocument(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("No knowledge base: upload a document before asking questions")]
    NoKnowledgeBase,

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error("Session was reset while the operation was in flight")]
    SessionReset,
}

impl AutoSpecError {
    /// Whether re-issuing the same request may succeed without changing input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutoSpecError::Embedding(_) | AutoSpecError::Generation(_) | AutoSpecError::SessionReset
        )
    }
}

impl From<toml::de::Error> for AutoSpecError {
    fn from(err: toml::de::Error) -> Self {
        AutoSpecError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AutoSpecError {
    fn from(err: toml::ser::Error) -> Self {
        AutoSpecError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AutoSpecError {
    fn from(err: serde_json::Error) -> Self {
        AutoSpecError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for AutoSpec operations.
pub type Result<T> = std::result::Result<T, AutoSpecError>;
