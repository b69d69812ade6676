//! Cosine similarity lookup over a [`MemoryStore`].

use super::node::NodeId;
use super::store::MemoryStore;

/// Best-matching node for a query vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityMatch {
    pub node: NodeId,
    /// Position in store iteration order.
    pub position: usize,
    pub similarity: f32,
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(-1.0, 1.0)
    }
}

/// Node with the highest cosine similarity to `query`.
///
/// `None` iff the store is empty. On equal similarity the node earliest in
/// iteration order wins.
#[must_use]
pub fn find_most_similar(store: &MemoryStore, query: &[f32]) -> Option<SimilarityMatch> {
    let mut best: Option<SimilarityMatch> = None;
    for (position, node) in store.iter().enumerate() {
        let similarity = cosine_similarity(query, node.centroid());
        let better = best.is_none_or(|b| similarity > b.similarity);
        if better {
            best = Some(SimilarityMatch {
                node: node.id(),
                position,
                similarity,
            });
        }
    }
    best
}

/// Up to `k` nodes ordered by descending similarity, ties by store order.
#[must_use]
pub fn rank(store: &MemoryStore, query: &[f32], k: usize) -> Vec<SimilarityMatch> {
    let mut scored: Vec<SimilarityMatch> = store
        .iter()
        .enumerate()
        .map(|(position, node)| SimilarityMatch {
            node: node.id(),
            position,
            similarity: cosine_similarity(query, node.centroid()),
        })
        .collect();
    // Stable sort keeps store order among equal scores.
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(k);
    scored
}
