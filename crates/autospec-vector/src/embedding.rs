//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` loads a sentence-transformer ONNX model (e.g.
//!   all-MiniLM-L6-v2) via ort and tokenizes with the HuggingFace tokenizers
//!   crate. This is the production embedding backend.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use autospec_core::config::EmbeddingConfig;
use autospec_core::error::AutoSpecError;
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

/// Service for generating text embeddings.
///
/// Implementations convert a batch of texts into fixed-dimensional vectors,
/// one per input and in input order. A batch either succeeds as a whole or
/// fails; callers never see a partial result.
pub trait EmbeddingService: Send + Sync {
    /// Generate one embedding vector per input text.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, AutoSpecError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed_batch` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Arc<dyn DynEmbeddingService>` to be stored in structs without generics.
///
/// A blanket implementation is provided so that every `EmbeddingService`
/// automatically implements `DynEmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate one embedding vector per input text (boxed future).
    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, AutoSpecError>> + Send + 'a>>;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Blanket impl: any `EmbeddingService` automatically implements `DynEmbeddingService`.
impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, AutoSpecError>> + Send + 'a>> {
        Box::pin(self.embed_batch(texts))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Embed a single query string through a dynamic embedding service.
pub async fn embed_query(
    service: &dyn DynEmbeddingService,
    text: &str,
) -> Result<Vec<f32>, AutoSpecError> {
    let texts = [text.to_string()];
    let mut vectors = service.embed_batch_boxed(&texts).await?;
    match (vectors.pop(), vectors.is_empty()) {
        (Some(vector), true) => Ok(vector),
        _ => Err(AutoSpecError::Embedding(
            "embedding service returned an unexpected number of vectors".to_string(),
        )),
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in values.iter_mut() {
            *val /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - real ONNX Runtime inference
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed embedding service using a sentence-transformer model.
///
/// Expects a model directory containing:
/// - `model.onnx`: the sentence-transformer ONNX export
/// - `tokenizer.json`: the HuggingFace fast-tokenizer file
///
/// The model should accept `input_ids`, `attention_mask`, and
/// `token_type_ids` as i64 inputs and produce token-level embeddings.
/// Masked mean pooling and L2 normalization produce one vector per input.
#[derive(Clone)]
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
    batch_size: usize,
}

// The session is only reached through the mutex.
unsafe impl Send for OnnxEmbeddingService {}
unsafe impl Sync for OnnxEmbeddingService {}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl OnnxEmbeddingService {
    /// Load the model described by the `[embedding]` config section.
    pub fn from_config(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, AutoSpecError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
            config.max_tokens,
            config.batch_size,
        )
    }

    /// Load from explicit model and tokenizer file paths.
    pub fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        max_tokens: usize,
        batch_size: usize,
    ) -> Result<Self, AutoSpecError> {
        if !model_path.exists() {
            return Err(AutoSpecError::Embedding(format!(
                "ONNX model not found at {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(AutoSpecError::Embedding(format!(
                "Tokenizer not found at {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| AutoSpecError::Embedding(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| AutoSpecError::Embedding(format!("ONNX set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| AutoSpecError::Embedding(format!("ONNX load model: {}", e)))?;

        // Sentence-transformer output is typically [batch, seq_len, hidden_dim].
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .map(|d| if d > 0 { d as usize } else { 384 })
            .unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            AutoSpecError::Embedding(format!("Failed to load tokenizer: {}", e))
        })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                ..Default::default()
            }))
            .map_err(|e| AutoSpecError::Embedding(format!("Tokenizer truncation: {}", e)))?;

        info!(
            model = %model_path.display(),
            dimensions,
            max_tokens,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
            batch_size: batch_size.max(1),
        })
    }

    /// Tokenize, run inference, and mean-pool one padded batch.
    fn embed_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AutoSpecError> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(AutoSpecError::Embedding("Cannot embed empty text".to_string()));
        }

        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(t.as_str(), true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AutoSpecError::Embedding(format!("Tokenization failed: {}", e)))?;

        let batch = encodings.len();
        let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        if seq_len == 0 {
            return Err(AutoSpecError::Embedding("Tokenizer produced no tokens".to_string()));
        }

        // Right-pad every row to seq_len; padded positions carry mask 0.
        let mut input_ids = vec![0i64; batch * seq_len];
        let mut attention_mask = vec![0i64; batch * seq_len];
        let mut token_type_ids = vec![0i64; batch * seq_len];
        for (row, enc) in encodings.iter().enumerate() {
            let base = row * seq_len;
            for (col, &id) in enc.get_ids().iter().enumerate() {
                input_ids[base + col] = id as i64;
            }
            for (col, &m) in enc.get_attention_mask().iter().enumerate() {
                attention_mask[base + col] = m as i64;
            }
            for (col, &t) in enc.get_type_ids().iter().enumerate() {
                token_type_ids[base + col] = t as i64;
            }
        }

        let ids_array = ndarray::Array2::from_shape_vec((batch, seq_len), input_ids)
            .map_err(|e| AutoSpecError::Embedding(format!("input_ids array: {}", e)))?;
        let mask_array = ndarray::Array2::from_shape_vec((batch, seq_len), attention_mask.clone())
            .map_err(|e| AutoSpecError::Embedding(format!("attention_mask array: {}", e)))?;
        let type_array = ndarray::Array2::from_shape_vec((batch, seq_len), token_type_ids)
            .map_err(|e| AutoSpecError::Embedding(format!("token_type_ids array: {}", e)))?;

        let ids_ref = TensorRef::from_array_view(&ids_array)
            .map_err(|e| AutoSpecError::Embedding(format!("TensorRef input_ids: {}", e)))?;
        let mask_ref = TensorRef::from_array_view(&mask_array)
            .map_err(|e| AutoSpecError::Embedding(format!("TensorRef attention_mask: {}", e)))?;
        let type_ref = TensorRef::from_array_view(&type_array)
            .map_err(|e| AutoSpecError::Embedding(format!("TensorRef token_type_ids: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| AutoSpecError::Embedding(format!("Session lock poisoned: {}", e)))?;
        let outputs = session
            .run(ort::inputs![ids_ref, mask_ref, type_ref])
            .map_err(|e| AutoSpecError::Embedding(format!("ONNX inference failed: {}", e)))?;

        // Token embeddings as a flat slice: [batch, seq_len, hidden_dim].
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AutoSpecError::Embedding(format!("Extract embeddings: {}", e)))?;

        let shape_dims: Vec<i64> = shape.iter().copied().collect();
        let hidden_dim = match shape_dims.as_slice() {
            [b, s, h] if *b as usize == batch && *s as usize == seq_len && *h > 0 => *h as usize,
            _ => {
                return Err(AutoSpecError::Embedding(format!(
                    "Unexpected output shape: {:?}",
                    shape_dims
                )))
            }
        };

        Ok(mean_pool(data, &attention_mask, batch, seq_len, hidden_dim))
    }
}

/// Average the unmasked token vectors of each row, then L2-normalise.
///
/// `tokens` is a row-major `[batch, seq_len, hidden_dim]` tensor and `mask`
/// a `[batch, seq_len]` attention mask. A row with no unmasked tokens pools
/// to the zero vector.
fn mean_pool(
    tokens: &[f32],
    mask: &[i64],
    batch: usize,
    seq_len: usize,
    hidden_dim: usize,
) -> Vec<Vec<f32>> {
    (0..batch)
        .map(|row| {
            let mut pooled = vec![0.0f32; hidden_dim];
            let live: Vec<usize> = (0..seq_len)
                .filter(|&tok| mask[row * seq_len + tok] > 0)
                .collect();
            for &tok in &live {
                let token = &tokens[(row * seq_len + tok) * hidden_dim..][..hidden_dim];
                for (acc, x) in pooled.iter_mut().zip(token) {
                    *acc += x;
                }
            }
            if !live.is_empty() {
                let n = live.len() as f32;
                pooled.iter_mut().for_each(|v| *v /= n);
            }
            l2_normalize(&mut pooled);
            pooled
        })
        .collect()
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AutoSpecError> {
        let svc = self.clone();
        let texts_owned = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut out = Vec::with_capacity(texts_owned.len());
            for batch in texts_owned.chunks(svc.batch_size) {
                out.extend(svc.embed_sync(batch)?);
                debug!(batch = batch.len(), done = out.len(), "ONNX batch embedded");
            }
            Ok(out)
        })
        .await
        .map_err(|e| AutoSpecError::Embedding(format!("Embedding task panicked: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic 384-dimensional vectors.
///
/// The output is derived from a hash of the input text, so identical inputs
/// always produce identical outputs. Similarity between different texts is
/// arbitrary.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub const DIMENSIONS: usize = 384;

    pub fn new() -> Self {
        Self
    }

    /// The vector `embed_batch` returns for `text`.
    pub fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(Self::DIMENSIONS);
        for i in 0..Self::DIMENSIONS {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }
        l2_normalize(&mut result);
        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AutoSpecError> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(AutoSpecError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(texts.iter().map(|t| Self::hash_to_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        Self::DIMENSIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_mock_embedding_dimension() {
        let service = MockEmbedding::new();
        let vecs = service.embed_batch(&texts(&["hello world"])).await.unwrap();
        assert_eq!(vecs.len(), 1);
        assert_eq!(vecs[0].len(), 384);
    }

    #[tokio::test]
    async fn test_mock_embedding_preserves_order() {
        let service = MockEmbedding::new();
        let vecs = service
            .embed_batch(&texts(&["first", "second", "third"]))
            .await
            .unwrap();
        assert_eq!(vecs.len(), 3);
        assert_eq!(vecs[1], MockEmbedding::hash_to_vector("second"));
        assert_ne!(vecs[0], vecs[2]);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed_batch(&texts(&["same text"])).await.unwrap();
        let v2 = service.embed_batch(&texts(&["same text"])).await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text_fails_whole_batch() {
        let service = MockEmbedding::new();
        let result = service.embed_batch(&texts(&["fine", "  "])).await;
        assert!(matches!(result, Err(AutoSpecError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_mock_embedding_is_unit_length() {
        let service = MockEmbedding::new();
        let vecs = service.embed_batch(&texts(&["norm check"])).await.unwrap();
        let norm: f32 = vecs[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_embed_query_through_dyn() {
        let service: Arc<dyn DynEmbeddingService> = Arc::new(MockEmbedding::new());
        let v = embed_query(service.as_ref(), "torque spec").await.unwrap();
        assert_eq!(v, MockEmbedding::hash_to_vector("torque spec"));
        assert_eq!(service.dimensions(), 384);
    }

    #[tokio::test]
    async fn test_empty_batch_is_ok() {
        let service = MockEmbedding::new();
        let vecs = service.embed_batch(&[]).await.unwrap();
        assert!(vecs.is_empty());
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0f32; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn test_mean_pool_ignores_masked_tokens() {
        // batch 2, seq_len 3, hidden 2
        let tokens = [
            1.0, 0.0, 3.0, 0.0, 100.0, 100.0, // row 0, last token padded
            0.0, 2.0, 0.0, 4.0, 0.0, 6.0, // row 1, all live
        ];
        let mask = [1, 1, 0, 1, 1, 1];
        let pooled = mean_pool(&tokens, &mask, 2, 3, 2);
        assert_eq!(pooled.len(), 2);
        // Row 0 averages to (2, 0) and normalises to (1, 0).
        assert!((pooled[0][0] - 1.0).abs() < 1e-6);
        assert!(pooled[0][1].abs() < 1e-6);
        // Row 1 averages to (0, 4) and normalises to (0, 1).
        assert!(pooled[1][0].abs() < 1e-6);
        assert!((pooled[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_pool_fully_masked_row_is_zero() {
        let pooled = mean_pool(&[5.0, 5.0], &[0], 1, 1, 2);
        assert_eq!(pooled, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn test_onnx_missing_model() {
        let result = OnnxEmbeddingService::from_config(
            &EmbeddingConfig::default(),
            Path::new("/nonexistent"),
        );
        assert!(matches!(result, Err(AutoSpecError::Embedding(_))));
    }
}
