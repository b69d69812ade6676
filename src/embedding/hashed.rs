use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Embedder, EmbeddingError};

/// Deterministic bag-of-features embedder.
///
/// Lower-cased words and character trigrams are hashed into `dimension`
/// signed buckets and the result is L2-normalised. Texts sharing vocabulary
/// land close together, which is enough to exercise the memory without a
/// model download. Same text, same seed, same vector, on every platform and
/// toolchain, so centroids in saved snapshots keep matching new embeddings.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimension: usize,
    seed: u64,
}

impl HashedEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self::with_seed(dimension, 0)
    }

    /// A zero `dimension` is bumped to 1.
    #[must_use]
    pub fn with_seed(dimension: usize, seed: u64) -> Self {
        Self {
            dimension: dimension.max(1),
            seed,
        }
    }

    /// Bucket index and sign from the first eight bytes of
    /// `SHA-256(seed_le || feature)`.
    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(head);
        #[allow(clippy::cast_possible_truncation)]
        let index = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    /// Embed synchronously.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0.0_f32; self.dimension];
        for word in &words {
            let (i, sign) = self.bucket(word);
            vector[i] += 2.0 * sign;

            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                let (i, sign) = self.bucket(&gram);
                vector[i] += sign;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
