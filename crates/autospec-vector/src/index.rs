//! In-memory vector index with brute-force cosine similarity search.
//!
//! Entries are only ever appended. Search is O(n) over all stored vectors,
//! which is fine for the few thousand chunks a handful of manuals produce.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::debug;

use autospec_core::error::AutoSpecError;
use autospec_core::types::Chunk;

/// A single hit returned from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity score (-1.0 to 1.0).
    pub score: f64,
}

/// Summary counters for status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub chunks: usize,
    pub documents: usize,
    pub dimensions: Option<usize>,
}

/// An entry stored in the vector index.
#[derive(Debug, Clone)]
struct VectorEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
    norm: f64,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Insertion order is preserved; search ties resolve to the earlier entry.
    entries: Vec<VectorEntry>,
    dimensions: Option<usize>,
    documents: BTreeSet<String>,
    /// Bumped by `clear` so in-flight batches from before a reset can be refused.
    epoch: u64,
}

/// Append-only in-memory vector index.
///
/// Thread-safe via interior RwLock. Cloning yields another handle to the same
/// index. A batch added with [`add`](VectorIndex::add) becomes visible to
/// searches all at once, never partially.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    state: Arc<RwLock<IndexState>>,
}

impl VectorIndex {
    /// Create a new empty vector index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of chunks with their embeddings.
    ///
    /// Validates the whole batch before touching the index: `chunks` and
    /// `vectors` must pair up one to one, every vector must be finite and have
    /// the index's dimensionality. On error the index is unchanged.
    pub fn add(&self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<(), AutoSpecError> {
        let mut state = self.write()?;
        Self::append(&mut state, chunks, vectors)
    }

    /// Like [`add`](VectorIndex::add), but only if the index has not been
    /// cleared since `epoch` was read.
    pub fn add_if_epoch(
        &self,
        epoch: u64,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), AutoSpecError> {
        let mut state = self.write()?;
        if state.epoch != epoch {
            return Err(AutoSpecError::SessionReset);
        }
        Self::append(&mut state, chunks, vectors)
    }

    fn append(
        state: &mut IndexState,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), AutoSpecError> {
        if chunks.len() != vectors.len() {
            return Err(AutoSpecError::Index(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let Some(first) = vectors.first() else {
            return Ok(());
        };

        let dims = state.dimensions.unwrap_or(first.len());
        if dims == 0 {
            return Err(AutoSpecError::Index("vectors must not be empty".to_string()));
        }
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dims {
                return Err(AutoSpecError::Index(format!(
                    "dimension mismatch at position {i}: expected {dims}, got {}",
                    v.len()
                )));
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(AutoSpecError::Index(format!(
                    "non-finite value in vector at position {i}"
                )));
            }
        }

        let added = chunks.len();
        state.entries.reserve(added);
        for (chunk, embedding) in chunks.into_iter().zip(vectors) {
            state.documents.insert(chunk.source.clone());
            let norm = magnitude(&embedding);
            state.entries.push(VectorEntry {
                chunk,
                embedding,
                norm,
            });
        }
        state.dimensions = Some(dims);

        debug!(added, total = state.entries.len(), "Appended batch to vector index");
        Ok(())
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order. Returns `min(k, len)` hits, and an
    /// empty list for an empty index or `k == 0` whatever the query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, AutoSpecError> {
        let state = self.read()?;
        if state.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if state.dimensions != Some(query.len()) {
            return Err(AutoSpecError::Index(format!(
                "query has {} dimensions, index has {:?}",
                query.len(),
                state.dimensions
            )));
        }

        let query_norm = magnitude(query);
        let mut scored: Vec<(usize, f64)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (pos, cosine_similarity(query, query_norm, entry)))
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| SearchHit {
                chunk: state.entries[pos].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Drop every entry and start a new epoch.
    pub fn clear(&self) -> Result<(), AutoSpecError> {
        let mut state = self.write()?;
        state.entries.clear();
        state.documents.clear();
        state.dimensions = None;
        state.epoch += 1;
        Ok(())
    }

    /// Current epoch; changes whenever the index is cleared.
    pub fn epoch(&self) -> u64 {
        self.peek().epoch
    }

    /// Return the number of chunks currently stored in the index.
    pub fn len(&self) -> usize {
        self.peek().entries.len()
    }

    /// Return true if the index contains no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality fixed by the first batch, if any.
    pub fn dimensions(&self) -> Option<usize> {
        self.peek().dimensions
    }

    /// Number of distinct source documents with at least one chunk.
    pub fn document_count(&self) -> usize {
        self.peek().documents.len()
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.peek();
        IndexStats {
            chunks: state.entries.len(),
            documents: state.documents.len(),
            dimensions: state.dimensions,
        }
    }

    /// Read guard for the counters, recovered from a poisoned lock.
    ///
    /// `append` and `clear` validate before mutating, so a panic while the
    /// write lock is held cannot leave the counters inconsistent.
    fn peek(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>, AutoSpecError> {
        self.state
            .read()
            .map_err(|e| AutoSpecError::Index(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>, AutoSpecError> {
        self.state
            .write()
            .map_err(|e| AutoSpecError::Index(format!("Lock poisoned: {}", e)))
    }
}

fn magnitude(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt()
}

/// Cosine similarity against a stored entry.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(query: &[f32], query_norm: f64, entry: &VectorEntry) -> f64 {
    if query_norm == 0.0 || entry.norm == 0.0 {
        return 0.0;
    }
    let dot: f64 = query
        .iter()
        .zip(entry.embedding.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    dot / (query_norm * entry.norm)
}
