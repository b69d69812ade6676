//! Associative conversational memory.
//!
//! Incoming messages are embedded by the caller and folded into *memory
//! nodes*: clusters of related turns that share a running centroid and keep
//! a short FIFO of recent messages. A new vector either merges into its
//! most similar node (when the cosine similarity clears the configured
//! threshold) or starts a new node. Centroids decay with time since their
//! last update.
//!
//! # Architecture
//!
//! ```text
//!  vector ──► matcher::find_most_similar ──► MemoryManager ──► MemoryStore
//!                                              │  merge-or-create
//!                                              │  decay / retire
//!                                              ▼
//!                                      context::build_messages ──► [Message]
//! ```
//!
//! - [`MemoryStore`]: owns the nodes of one user, insertion ordered
//! - [`matcher`]: cosine similarity and best-match lookup (pure)
//! - [`MemoryManager`]: merge-or-create policy and decay
//! - [`context`]: outgoing request assembly from a matched node
//! - [`snapshot`]: save/load a store together with scaler parameters
//!
//! # Example
//!
//! ```rust
//! use gng_memory::llm::MessageRole;
//! use gng_memory::memory::{MemoryConfig, MemoryManager};
//!
//! let mut memory = MemoryManager::new(MemoryConfig::default()).unwrap();
//! let first = memory.add_to_memory(&[1.0, 0.0], "hello", MessageRole::User).unwrap();
//! let second = memory.add_to_memory(&[0.95, 0.05], "hello again", MessageRole::User).unwrap();
//!
//! assert_eq!(first.node(), second.node());
//! assert_eq!(memory.len(), 1);
//! ```

pub mod context;
pub mod manager;
pub mod matcher;
pub mod node;
pub mod scaler;
pub mod snapshot;
pub mod store;

pub use context::{AssembledContext, ContextAssembler, build_messages};
pub use manager::{DecayReport, MemoryManager, MergeOutcome};
pub use matcher::{SimilarityMatch, cosine_similarity, find_most_similar};
pub use node::{MemoryNode, NodeId};
pub use scaler::MinMaxScaler;
pub use snapshot::{Snapshot, SnapshotError};
pub use store::MemoryStore;

use serde::{Deserialize, Serialize};

/// Errors raised by memory operations.
///
/// An empty store is not an error; lookups return `None` instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MemoryError {
    #[error("Vector dimension mismatch: store holds {expected}-dim vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(&'static str),

    #[error("Invalid memory configuration: {0}")]
    InvalidConfig(String),
}

/// Tuning of the merge-or-create and decay policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Blend factor α in `c' = (1 - α)c + αq`, in `(0, 1]`.
    pub learning_rate: f32,
    /// Minimum cosine similarity for a merge. `-1.0` merges into the best
    /// match unconditionally.
    pub similarity_threshold: f32,
    /// Exponential decay rate per second of elapsed time.
    pub decay_rate: f64,
    /// Messages kept per node (K).
    pub max_messages: usize,
    /// Node cap; the least recently updated node is evicted beyond it.
    pub max_nodes: Option<usize>,
    /// Nodes whose centroid norm falls below this after decay are retired.
    /// `0.0` (the default) disables retirement.
    pub retire_below_norm: f32,
    /// Fixed embedding dimension. When unset the first stored vector fixes it.
    pub dimension: Option<usize>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            similarity_threshold: 0.8,
            decay_rate: 0.1,
            max_messages: 5,
            max_nodes: None,
            retire_below_norm: 0.0,
            dimension: None,
        }
    }
}

impl MemoryConfig {
    /// Check ranges; every constructor of [`MemoryManager`] calls this.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(MemoryError::InvalidConfig(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(MemoryError::InvalidConfig(format!(
                "similarity_threshold must be in [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(MemoryError::InvalidConfig(format!(
                "decay_rate must be finite and >= 0, got {}",
                self.decay_rate
            )));
        }
        if self.max_messages == 0 {
            return Err(MemoryError::InvalidConfig(
                "max_messages must be at least 1".to_string(),
            ));
        }
        if self.max_nodes == Some(0) {
            return Err(MemoryError::InvalidConfig(
                "max_nodes must be at least 1 when set".to_string(),
            ));
        }
        if !self.retire_below_norm.is_finite() || self.retire_below_norm < 0.0 {
            return Err(MemoryError::InvalidConfig(format!(
                "retire_below_norm must be finite and >= 0, got {}",
                self.retire_below_norm
            )));
        }
        if self.dimension == Some(0) {
            return Err(MemoryError::InvalidConfig(
                "dimension must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
