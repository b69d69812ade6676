//! Text embedding providers.
//!
//! The memory core only needs `embed(text) -> vector` with a dimension that
//! stays fixed for the lifetime of the process.
//!
//! ```text
//! Embedder (trait)
//! ├── FastEmbedder    (fastembed, local sentence-transformer model)
//! └── HashedEmbedder  (deterministic feature hashing, offline and tests)
//! ```

mod hashed;
mod sentence;

pub use sentence::FastEmbedder;
pub use hashed::HashedEmbedder;

use async_trait::async_trait;

/// Errors that can occur during embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("Failed to generate embeddings: {0}")]
    Generation(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty input provided")]
    EmptyInput,

    #[error("Blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic for identical input within a
/// process, otherwise similarity matching is not reproducible.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Output dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed and verify the vector has [`Embedder::dimension`] entries.
    async fn embed_checked(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector = self.embed(text).await?;
        if vector.len() == self.dimension() {
            Ok(vector)
        } else {
            Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            })
        }
    }
}
