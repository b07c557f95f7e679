//! One operator session: a knowledge base plus a running conversation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use autospec_core::config::{AutoSpecConfig, CondenseStrategy};
use autospec_core::error::Result;
use autospec_core::types::{AnswerResult, SessionResponse, Turn};
use autospec_ingest::DocumentIngestor;
use autospec_vector::embedding::DynEmbeddingService;
use autospec_vector::index::{IndexStats, VectorIndex};
use autospec_vector::pipeline::IndexingPipeline;

use crate::condense::{HeuristicCondenser, LlmCondenser, QueryCondenser};
use crate::generator::AnswerGenerator;
use crate::llm::LanguageModel;
use crate::memory::ConversationMemory;

/// Owns the vector index and conversation memory for one conversation and
/// exposes the operations a front end needs.
///
/// Callers deduplicate uploads by document name and gate questions on
/// [`RagSession::is_ready`]; the session itself does neither.
pub struct RagSession {
    ingestor: DocumentIngestor,
    pipeline: IndexingPipeline,
    generator: AnswerGenerator,
    index: VectorIndex,
    memory: ConversationMemory,
    excerpt_chars: usize,
}

impl RagSession {
    /// Build an empty session from configuration and the two model backends.
    pub fn new(
        config: &AutoSpecConfig,
        embedder: Arc<dyn DynEmbeddingService>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        config.validate()?;

        let index = VectorIndex::new();
        let memory = ConversationMemory::with_max_turns(config.conversation.max_turns);
        let llm_timeout = Duration::from_secs(config.llm.timeout_secs);

        let condenser: Arc<dyn QueryCondenser> = match config.conversation.condense {
            CondenseStrategy::Llm => Arc::new(LlmCondenser::new(model.clone(), llm_timeout)?),
            CondenseStrategy::Heuristic => Arc::new(HeuristicCondenser::default()),
        };

        let pipeline =
            IndexingPipeline::from_config(index.clone(), embedder.clone(), &config.embedding);
        let generator = AnswerGenerator::new(index.clone(), memory.clone(), embedder, condenser, model)?
            .with_top_k(config.retrieval.top_k)
            .with_timeouts(
                Duration::from_secs(config.embedding.timeout_secs),
                llm_timeout,
            );

        info!(
            top_k = config.retrieval.top_k,
            condense = ?config.conversation.condense,
            max_turns = ?config.conversation.max_turns,
            "Session created"
        );

        Ok(Self {
            ingestor: DocumentIngestor::new(&config.ingest)?,
            pipeline,
            generator,
            index,
            memory,
            excerpt_chars: config.conversation.excerpt_chars,
        })
    }

    /// Ingest, embed, and index one document. Returns the number of chunks indexed.
    ///
    /// The document becomes searchable all at once or not at all. A
    /// [`reset`](RagSession::reset) at any point before the commit discards it.
    pub async fn process_document(&self, source: &str, bytes: Vec<u8>) -> Result<usize> {
        let epoch = self.index.epoch();
        let chunks = match self.ingestor.ingest(source, bytes).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(source, error = %e, "Document skipped");
                return Err(e);
            }
        };
        self.pipeline.index_chunks_at(epoch, chunks).await.inspect_err(|e| {
            warn!(source, error = %e, "Indexing failed");
        })
    }

    /// Read a document from disk and process it under its file name.
    pub async fn process_document_path(&self, path: &Path) -> Result<usize> {
        let bytes = tokio::fs::read(path).await?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.process_document(&source, bytes).await
    }

    /// Answer a question and package it for display with truncated excerpts.
    pub async fn get_response(&self, question: &str) -> Result<SessionResponse> {
        let result = self.answer(question).await?;
        Ok(SessionResponse::from_answer(&result, self.excerpt_chars))
    }

    /// Answer a question, returning the full evidence chunks.
    pub async fn answer(&self, question: &str) -> Result<AnswerResult> {
        self.generator.answer(question).await
    }

    pub fn history(&self) -> Vec<Turn> {
        self.memory.history()
    }

    /// True once at least one document has been indexed.
    pub fn is_ready(&self) -> bool {
        !self.index.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// Discard the knowledge base and conversation.
    ///
    /// Documents and answers still in flight when this runs are not committed.
    pub fn reset(&self) -> Result<()> {
        self.index.clear()?;
        self.memory.clear();
        info!("Session reset");
        Ok(())
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn generator(&self) -> &AnswerGenerator {
        &self.generator
    }
}
