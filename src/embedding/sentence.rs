use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::{Embedder, EmbeddingError};

/// Sentence embeddings from a local fastembed model.
///
/// The model is loaded lazily on first use (or eagerly through
/// [`FastEmbedder::initialize`]) and moved into a blocking task for each
/// call, since `TextEmbedding::embed` is synchronous and needs `&mut`.
pub struct FastEmbedder {
    model_name: EmbeddingModel,
    dimension: usize,
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl FastEmbedder {
    /// Creates an embedder from a model name such as `all-MiniLM-L6-v2`.
    pub fn from_model_str(model_name: &str) -> Result<Self, EmbeddingError> {
        let (model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "AllMiniLML6V2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "all-MiniLM-L12-v2" | "AllMiniLML12V2" => (EmbeddingModel::AllMiniLML12V2, 384),
            "bge-small-en-v1.5" | "BGESmallENV15" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" | "BGEBaseENV15" => (EmbeddingModel::BGEBaseENV15, 768),
            "paraphrase-multilingual-MiniLM-L12-v2" | "ParaphraseMLMiniLML12V2" => {
                (EmbeddingModel::ParaphraseMLMiniLML12V2, 384)
            }
            "multilingual-e5-small" | "MultilingualE5Small" => {
                (EmbeddingModel::MultilingualE5Small, 384)
            }
            _ => {
                return Err(EmbeddingError::ModelInit(format!(
                    "Unknown embedding model: '{model_name}'. Supported models: all-MiniLM-L6-v2, all-MiniLM-L12-v2, bge-small-en-v1.5, bge-base-en-v1.5, paraphrase-multilingual-MiniLM-L12-v2, multilingual-e5-small"
                )));
            }
        };

        Ok(Self {
            model_name: model,
            dimension,
            model: Arc::new(Mutex::new(None)),
        })
    }

    /// Creates an embedder from config, validating the expected dimension.
    pub fn from_config(model_name: &str, expected_dim: usize) -> Result<Self, EmbeddingError> {
        let embedder = Self::from_model_str(model_name)?;
        if embedder.dimension != expected_dim {
            return Err(EmbeddingError::ModelInit(format!(
                "Dimension mismatch: model '{model_name}' produces {}-dim vectors but config specifies {expected_dim}",
                embedder.dimension
            )));
        }
        Ok(embedder)
    }

    /// Loads the model if it is not loaded yet.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), EmbeddingError> {
        let mut model_guard = self.model.lock().await;
        if model_guard.is_none() {
            info!(model = ?self.model_name, "Initializing fastembed model");
            let mut options = InitOptions::new(self.model_name.clone());
            options.show_download_progress = true;

            let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
                .await?
                .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;
            *model_guard = Some(model);
            info!(model = ?self.model_name, dimension = self.dimension, "Embedding model initialized");
        }
        Ok(())
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.initialize().await?;

        let mut model_guard = self.model.lock().await;
        let mut owned_model = model_guard
            .take()
            .ok_or_else(|| EmbeddingError::ModelInit("model unexpectedly unloaded".into()))?;

        let (embeddings_res, returned_model) = tokio::task::spawn_blocking(move || {
            let res = owned_model.embed(texts, None);
            (res, owned_model)
        })
        .await?;

        *model_guard = Some(returned_model);
        embeddings_res.map_err(|e| EmbeddingError::Generation(e.to_string()))
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let embedding = self
            .embed_batch(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Generation("Empty embedding result".into()))?;

        debug!(dimension = embedding.len(), "Generated embedding");
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_model_str() {
        assert!(FastEmbedder::from_model_str("all-MiniLM-L6-v2").is_ok());
        assert!(FastEmbedder::from_model_str("unknown-model").is_err());
    }

    #[test]
    fn test_from_config_dimension_mismatch() {
        assert!(FastEmbedder::from_config("all-MiniLM-L6-v2", 512).is_err());
        let embedder = FastEmbedder::from_config("all-MiniLM-L6-v2", 384).unwrap();
        assert_eq!(embedder.dimension(), 384);
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_loading_model() {
        let embedder = FastEmbedder::from_model_str("all-MiniLM-L6-v2").unwrap();
        assert!(matches!(
            embedder.embed("   ").await,
            Err(EmbeddingError::EmptyInput)
        ));
    }

    #[tokio::test]
    #[ignore = "Downloads model from network, slow"]
    async fn test_similar_entries_embed_closer() {
        use crate::memory::cosine_similarity;

        let embedder = FastEmbedder::from_model_str("all-MiniLM-L6-v2").unwrap();
        let garden = embedder.embed("I used to love gardening").await.unwrap();
        let show = embedder.embed("I watched a gardening show today").await.unwrap();
        let guitar = embedder.embed("Learning guitar seems difficult").await.unwrap();

        assert_eq!(garden.len(), 384);
        assert!(cosine_similarity(&garden, &show) > cosine_similarity(&garden, &guitar));
    }
}
