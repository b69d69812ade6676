//! Merge-or-create policy and time decay.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::matcher::{self, SimilarityMatch};
use super::node::{MemoryNode, NodeId};
use super::store::MemoryStore;
use super::{MemoryConfig, MemoryError};
use crate::llm::{Message, MessageRole};

/// Which node an [`MemoryManager::add_to_memory`] call touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeOutcome {
    /// A new node was created. `evicted` names the node dropped to stay
    /// under `max_nodes`.
    Created {
        node: NodeId,
        evicted: Option<NodeId>,
    },
    /// The message was blended into an existing node.
    Merged { node: NodeId, similarity: f32 },
}

impl MergeOutcome {
    #[must_use]
    pub fn node(&self) -> NodeId {
        match *self {
            Self::Created { node, .. } | Self::Merged { node, .. } => node,
        }
    }

    #[must_use]
    pub fn is_merge(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }
}

/// Result of one decay pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecayReport {
    pub decayed: usize,
    pub retired: Vec<NodeId>,
}

/// Single-writer owner of one user's [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryManager {
    store: MemoryStore,
    config: MemoryConfig,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        let store = match config.dimension {
            Some(dim) => MemoryStore::with_dimension(dim),
            None => MemoryStore::new(),
        };
        Ok(Self { store, config })
    }

    /// Wrap an existing store, re-checking it against `config`.
    pub fn from_store(config: MemoryConfig, mut store: MemoryStore) -> Result<Self, MemoryError> {
        config.validate()?;
        store.revalidate(config.dimension, config.max_messages)?;
        Ok(Self { store, config })
    }

    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&MemoryNode> {
        self.store.get(id)
    }

    /// Best match regardless of threshold.
    #[must_use]
    pub fn find_most_similar(&self, query: &[f32]) -> Option<SimilarityMatch> {
        matcher::find_most_similar(&self.store, query)
    }

    /// Up to `k` nodes closest to `query`, threshold ignored.
    #[must_use]
    pub fn rank(&self, query: &[f32], k: usize) -> Vec<SimilarityMatch> {
        matcher::rank(&self.store, query, k)
    }

    /// Best match that clears `similarity_threshold`, i.e. the node the next
    /// `add_to_memory` with this vector would merge into.
    #[must_use]
    pub fn find_match(&self, query: &[f32]) -> Option<SimilarityMatch> {
        self.find_most_similar(query)
            .filter(|m| m.similarity >= self.config.similarity_threshold)
    }

    pub fn add_to_memory(
        &mut self,
        query: &[f32],
        content: impl Into<String>,
        role: MessageRole,
    ) -> Result<MergeOutcome, MemoryError> {
        self.add_to_memory_at(query, content, role, Utc::now())
    }

    /// Merge `query` into its best node or create a new one. Exactly one
    /// node is created or updated; on error the store is untouched.
    pub fn add_to_memory_at(
        &mut self,
        query: &[f32],
        content: impl Into<String>,
        role: MessageRole,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, MemoryError> {
        self.store.check_vector(query)?;
        let message = Message::new(role, content);

        if let Some(best) = self.find_match(query) {
            let alpha = self.config.learning_rate;
            if let Some(node) = self.store.get_mut(best.node) {
                node.merge(query, message, alpha, now);
                metrics::counter!("memory.nodes.merged").increment(1);
                debug!(
                    node = %best.node,
                    similarity = best.similarity,
                    messages = node.message_count(),
                    "Merged message into memory node"
                );
                return Ok(MergeOutcome::Merged {
                    node: best.node,
                    similarity: best.similarity,
                });
            }
        }

        let evicted = match self.config.max_nodes {
            Some(cap) if self.store.len() >= cap => self
                .store
                .least_recently_updated()
                .and_then(|id| self.store.remove(id))
                .map(|n| n.id()),
            _ => None,
        };
        if let Some(id) = evicted {
            metrics::counter!("memory.nodes.retired").increment(1);
            debug!(node = %id, "Evicted least recently updated memory node");
        }

        let node = self
            .store
            .insert(query.to_vec(), message, self.config.max_messages, now)?;
        metrics::counter!("memory.nodes.created").increment(1);
        debug!(node = %node, total = self.store.len(), "Created memory node");

        Ok(MergeOutcome::Created { node, evicted })
    }

    pub fn decay_memory(&mut self) -> DecayReport {
        self.decay_memory_at(Utc::now())
    }

    /// Scale every centroid by `exp(-decay_rate * elapsed)` and retire nodes
    /// whose norm falls below `retire_below_norm`.
    pub fn decay_memory_at(&mut self, now: DateTime<Utc>) -> DecayReport {
        let rate = self.config.decay_rate;
        let mut decayed = 0;
        for node in self.store.nodes_mut() {
            if node.decay(rate, now) < 1.0 {
                decayed += 1;
            }
        }

        let floor = self.config.retire_below_norm;
        let retired = if floor > 0.0 {
            self.store.retain(|n| n.norm() >= floor)
        } else {
            Vec::new()
        };

        if !retired.is_empty() {
            metrics::counter!("memory.nodes.retired").increment(retired.len() as u64);
            info!(
                retired = retired.len(),
                remaining = self.store.len(),
                "Retired decayed memory nodes"
            );
        }

        DecayReport { decayed, retired }
    }

    /// Drop every node, keeping configuration and dimension.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    #[must_use]
    pub fn into_store(self) -> MemoryStore {
        self.store
    }
}
