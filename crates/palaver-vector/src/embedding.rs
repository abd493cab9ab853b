//! Embedding service trait and implementations.
//!
//! - `OnnxEmbedder` runs a sentence-transformer ONNX model (e.g.
//!   all-MiniLM-L6-v2) via ort, tokenizing with the HuggingFace tokenizers
//!   crate. The session is loaded lazily, exactly once, on a blocking
//!   thread, so no request-path caller waits on model load.
//! - `MockEmbedder` provides deterministic hash-based unit vectors for
//!   testing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;
use tracing::info;

use palaver_core::error::PalaverError;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional unit vectors, so that
/// Euclidean nearest-neighbor search over them ranks like cosine similarity.
/// Used for both ingestion (indexing) and search (queries).
pub trait Embedder: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, PalaverError>> + Send;

    /// Generate embeddings for a batch of texts, in order.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, PalaverError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`Embedder`] for dynamic dispatch.
///
/// Because `Embedder::embed` returns `impl Future` it is not object-safe.
/// This trait uses boxed futures instead, allowing `Box<dyn DynEmbedder>` to
/// be stored in structs without generics. A blanket implementation is
/// provided so every `Embedder` automatically implements `DynEmbedder`.
pub trait DynEmbedder: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, PalaverError>> + Send + 'a>,
    >;

    /// Generate embeddings for a batch of texts (boxed future).
    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Vec<f32>>, PalaverError>> + Send + 'a>,
    >;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: Embedder> DynEmbedder for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, PalaverError>> + Send + 'a>,
    > {
        Box::pin(self.embed(text))
    }

    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Vec<f32>>, PalaverError>> + Send + 'a>,
    > {
        Box::pin(self.embed_batch(texts))
    }

    fn dimensions(&self) -> usize {
        Embedder::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbedder - real ONNX Runtime inference, lazily loaded
// ---------------------------------------------------------------------------

/// Loaded model state shared across embed calls.
struct ModelState {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimensions: usize,
}

// ort::Session is Send + Sync internally (uses Arc<SharedSessionInner>);
// all mutable access goes through the Mutex.
unsafe impl Send for ModelState {}
unsafe impl Sync for ModelState {}

/// ONNX Runtime-backed embedding service using a sentence-transformer model.
///
/// Expects a model directory containing:
/// - `model.onnx`  — the sentence-transformer ONNX export
/// - `tokenizer.json` — the HuggingFace fast-tokenizer file
///
/// The model accepts `input_ids`, `attention_mask`, and `token_type_ids` as
/// i64 inputs and produces token-level embeddings; masked mean pooling and
/// L2 normalization yield one unit vector per input. Construction is cheap;
/// the session and tokenizer load on first use and are reused afterwards.
pub struct OnnxEmbedder {
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    configured_dims: usize,
    state: OnceCell<Arc<ModelState>>,
}

impl std::fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("model_path", &self.model_path)
            .field("loaded", &self.state.initialized())
            .finish()
    }
}

impl OnnxEmbedder {
    /// Point the embedder at a model directory. Nothing is loaded yet.
    ///
    /// The directory must contain `model.onnx` and `tokenizer.json` by the
    /// time the first embed call runs.
    pub fn from_directory(model_dir: &Path, dimensions: usize) -> Self {
        Self::from_files(
            model_dir.join("model.onnx"),
            model_dir.join("tokenizer.json"),
            dimensions,
        )
    }

    /// Point the embedder at explicit model and tokenizer file paths.
    pub fn from_files(model_path: PathBuf, tokenizer_path: PathBuf, dimensions: usize) -> Self {
        Self {
            model_path,
            tokenizer_path,
            configured_dims: dimensions,
            state: OnceCell::new(),
        }
    }

    /// Get the loaded model, loading it on first call.
    async fn model(&self) -> Result<Arc<ModelState>, PalaverError> {
        self.state
            .get_or_try_init(|| async {
                let model_path = self.model_path.clone();
                let tokenizer_path = self.tokenizer_path.clone();
                let fallback_dims = self.configured_dims;
                tokio::task::spawn_blocking(move || {
                    load_model(&model_path, &tokenizer_path, fallback_dims)
                })
                .await
                .map_err(|e| PalaverError::Embedding(format!("Model load task panicked: {}", e)))?
            })
            .await
            .cloned()
    }

    /// Embed one text on a blocking thread.
    async fn embed_one(&self, text: String) -> Result<Vec<f32>, PalaverError> {
        let state = self.model().await?;
        tokio::task::spawn_blocking(move || embed_sync(&state, &text))
            .await
            .map_err(|e| PalaverError::Embedding(format!("Embedding task panicked: {}", e)))?
    }
}

/// Load the ONNX session and tokenizer from disk. Runs on a blocking thread.
fn load_model(
    model_path: &Path,
    tokenizer_path: &Path,
    fallback_dims: usize,
) -> Result<Arc<ModelState>, PalaverError> {
    if !model_path.exists() {
        return Err(PalaverError::Embedding(format!(
            "ONNX model not found at {}",
            model_path.display()
        )));
    }
    if !tokenizer_path.exists() {
        return Err(PalaverError::Embedding(format!(
            "Tokenizer not found at {}",
            tokenizer_path.display()
        )));
    }

    let session = Session::builder()
        .map_err(|e| PalaverError::Embedding(format!("ONNX session builder: {}", e)))?
        .with_intra_threads(1)
        .map_err(|e| PalaverError::Embedding(format!("ONNX set threads: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| PalaverError::Embedding(format!("ONNX load model: {}", e)))?;

    // Detect output dimensions from the model output type.
    // Sentence-transformer output is typically [batch, seq_len, hidden_dim].
    let dimensions = session
        .outputs()
        .first()
        .and_then(|out| out.dtype().tensor_shape())
        .and_then(|shape| shape.last().copied())
        .map(|d| if d > 0 { d as usize } else { fallback_dims })
        .unwrap_or(fallback_dims);

    let tokenizer = Tokenizer::from_file(tokenizer_path)
        .map_err(|e| PalaverError::Embedding(format!("Failed to load tokenizer: {}", e)))?;

    info!(
        model = %model_path.display(),
        dimensions,
        "Loaded ONNX embedding model"
    );

    Ok(Arc::new(ModelState {
        session: Mutex::new(session),
        tokenizer,
        dimensions,
    }))
}

/// Tokenize, run inference, and mean-pool the output.
fn embed_sync(state: &ModelState, text: &str) -> Result<Vec<f32>, PalaverError> {
    if text.trim().is_empty() {
        return Err(PalaverError::Embedding("Cannot embed empty text".to_string()));
    }

    let encoding = state
        .tokenizer
        .encode(text, true)
        .map_err(|e| PalaverError::Embedding(format!("Tokenization failed: {}", e)))?;

    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| m as i64)
        .collect();
    let token_type_ids: Vec<i64> = encoding
        .get_type_ids()
        .iter()
        .map(|&t| t as i64)
        .collect();

    let seq_len = input_ids.len();

    let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
        .map_err(|e| PalaverError::Embedding(format!("input_ids array: {}", e)))?;
    let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
        .map_err(|e| PalaverError::Embedding(format!("attention_mask array: {}", e)))?;
    let type_array = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
        .map_err(|e| PalaverError::Embedding(format!("token_type_ids array: {}", e)))?;

    let ids_ref = TensorRef::from_array_view(&ids_array)
        .map_err(|e| PalaverError::Embedding(format!("TensorRef input_ids: {}", e)))?;
    let mask_ref = TensorRef::from_array_view(&mask_array)
        .map_err(|e| PalaverError::Embedding(format!("TensorRef attention_mask: {}", e)))?;
    let type_ref = TensorRef::from_array_view(&type_array)
        .map_err(|e| PalaverError::Embedding(format!("TensorRef token_type_ids: {}", e)))?;

    let mut session = state
        .session
        .lock()
        .map_err(|e| PalaverError::Embedding(format!("Session lock poisoned: {}", e)))?;
    let outputs = session
        .run(ort::inputs![ids_ref, mask_ref, type_ref])
        .map_err(|e| PalaverError::Embedding(format!("ONNX inference failed: {}", e)))?;

    // Extract token embeddings as flat slice: [1, seq_len, hidden_dim].
    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| PalaverError::Embedding(format!("Extract embeddings: {}", e)))?;

    let shape_dims: Vec<i64> = shape.iter().copied().collect();
    if shape_dims.len() < 2 {
        return Err(PalaverError::Embedding(format!(
            "Unexpected output shape: {:?}",
            shape_dims
        )));
    }

    let hidden_dim = *shape_dims.last().unwrap() as usize;

    // Mean pooling over the sequence dimension, masked by attention_mask.
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;

    for (tok_idx, &mask_val) in attention_mask.iter().enumerate() {
        if mask_val > 0 {
            let offset = tok_idx * hidden_dim;
            for dim in 0..hidden_dim {
                pooled[dim] += data[offset + dim];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut pooled {
            *val /= count;
        }
    }

    normalize(&mut pooled);

    Ok(pooled)
}

/// L2-normalize a vector in place. Zero vectors are left unchanged.
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector {
            *val /= norm;
        }
    }
}

impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PalaverError> {
        self.embed_one(text.to_string()).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PalaverError> {
        let state = self.model().await?;
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|text| embed_sync(&state, text))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| PalaverError::Embedding(format!("Embedding task panicked: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.state
            .get()
            .map(|s| s.dimensions)
            .unwrap_or(self.configured_dims)
    }
}

// ---------------------------------------------------------------------------
// MockEmbedder - deterministic hash-based unit vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic 384-dimensional vectors.
///
/// The output is derived from a hash of the input text, so identical inputs
/// always produce identical outputs. Vectors are L2-normalized to match the
/// real backend's unit-norm contract.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedder;

impl MockEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(384);
        for i in 0..384 {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        normalize(&mut result);
        result
    }
}

impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PalaverError> {
        if text.trim().is_empty() {
            return Err(PalaverError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(Self::hash_to_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PalaverError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        384
    }
}
