//! Palaver vector crate - embedding service and the dual-granularity
//! append-only vector index.
//!
//! Provides the `Embedder` trait with an ONNX sentence-transformer backend
//! and a deterministic mock, the persistent `FlatIndex` (exact Euclidean
//! scan over unit vectors), and the `SearchIndex` service that owns one
//! index per granularity (message, sentence) behind one lock each.

pub mod embedding;
pub mod index;
pub mod store;

pub use embedding::{DynEmbedder, Embedder, MockEmbedder, OnnxEmbedder};
pub use index::FlatIndex;
pub use store::{SearchIndex, SentenceHit, SentenceRecord};
