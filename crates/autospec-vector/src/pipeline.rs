//! AutoSpec indexing pipeline.
//!
//! The IndexingPipeline takes one document's chunks through embedding and
//! into the vector index as a single indivisible batch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use autospec_core::config::EmbeddingConfig;
use autospec_core::error::AutoSpecError;
use autospec_core::types::Chunk;

use crate::embedding::DynEmbeddingService;
use crate::index::VectorIndex;

/// Embeds chunks and commits them to a shared [`VectorIndex`].
///
/// Processes a document's chunks through:
/// 1. Batched embedding under a timeout
/// 2. Vector count check
/// 3. One atomic append to the index
///
/// If any step fails, nothing from the document reaches the index.
pub struct IndexingPipeline {
    index: VectorIndex,
    embedder: Arc<dyn DynEmbeddingService>,
    batch_size: usize,
    timeout: Duration,
}

impl IndexingPipeline {
    /// Create a new pipeline over the given index and embedder.
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn DynEmbeddingService>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            embedder,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    /// Create a pipeline using the `[embedding]` config section.
    pub fn from_config(
        index: VectorIndex,
        embedder: Arc<dyn DynEmbeddingService>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self::new(
            index,
            embedder,
            config.batch_size,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Embed and index one document's chunks. Returns the number indexed.
    ///
    /// Fails with [`AutoSpecError::Embedding`] if any batch fails or the whole
    /// run exceeds the timeout, and with [`AutoSpecError::SessionReset`] if the
    /// index was cleared while embedding was in flight.
    pub async fn index_chunks(&self, chunks: Vec<Chunk>) -> Result<usize, AutoSpecError> {
        self.index_chunks_at(self.index.epoch(), chunks).await
    }

    /// Like [`index_chunks`](IndexingPipeline::index_chunks), but commits only
    /// if the index is still at `epoch`.
    ///
    /// Callers read the epoch before extracting the document so a reset
    /// during parsing also discards it.
    pub async fn index_chunks_at(
        &self,
        epoch: u64,
        chunks: Vec<Chunk>,
    ) -> Result<usize, AutoSpecError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = match tokio::time::timeout(self.timeout, self.embed_all(&texts)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(chunks = chunks.len(), "Embedding timed out");
                return Err(AutoSpecError::Embedding(format!(
                    "embedding {} chunks exceeded {}s",
                    chunks.len(),
                    self.timeout.as_secs()
                )));
            }
        };

        if vectors.len() != chunks.len() {
            return Err(AutoSpecError::Embedding(format!(
                "embedding service returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let count = chunks.len();
        let source = chunks[0].source.clone();
        self.index.add_if_epoch(epoch, chunks, vectors)?;

        info!(source = %source, chunks = count, total = self.index.len(), "Document indexed");
        Ok(count)
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AutoSpecError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.embedder.embed_batch_boxed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(AutoSpecError::Embedding(format!(
                    "batch of {} texts produced {} vectors",
                    batch.len(),
                    embedded.len()
                )));
            }
            debug!(batch = batch.len(), done = vectors.len() + embedded.len(), "Embedded batch");
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Get a reference to the underlying vector index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Get the embedding service shared with query-time retrieval.
    pub fn embedder(&self) -> &Arc<dyn DynEmbeddingService> {
        &self.embedder
    }
}
