//! AutoSpec vector crate - embedding service, in-memory index, and indexing pipeline.
//!
//! Provides an append-only vector index with cosine similarity search,
//! an embedding service trait with an ONNX sentence-transformer backend and a
//! deterministic mock for testing, and the pipeline that embeds a document's
//! chunks and commits them to the index as one batch.

pub mod embedding;
pub mod index;
pub mod pipeline;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OnnxEmbeddingService};
pub use index::{IndexStats, SearchHit, VectorIndex};
pub use pipeline::IndexingPipeline;
