//! Node collection owned by a single user's memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MemoryError;
use super::node::{MemoryNode, NodeId};
use crate::llm::Message;

/// Unordered collection of memory nodes.
///
/// Iteration follows insertion order, which the matcher uses for
/// tie-breaking. Nodes are never shared between stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    nodes: Vec<MemoryNode>,
    next_id: u64,
    dimension: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only accepts vectors of length `dimension`.
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Vector dimension, once fixed by configuration or the first insert.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &MemoryNode> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&MemoryNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut MemoryNode> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    /// Position of a node in iteration order.
    #[must_use]
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == id)
    }

    /// Reject vectors that cannot live in this store.
    pub fn check_vector(&self, vector: &[f32]) -> Result<(), MemoryError> {
        if vector.is_empty() {
            return Err(MemoryError::InvalidVector("empty"));
        }
        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(MemoryError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(MemoryError::InvalidVector("non-finite component"));
        }
        Ok(())
    }

    /// Add a node seeded with `centroid` and one message.
    pub(crate) fn insert(
        &mut self,
        centroid: Vec<f32>,
        first: Message,
        capacity: usize,
        now: DateTime<Utc>,
    ) -> Result<NodeId, MemoryError> {
        self.check_vector(&centroid)?;
        self.dimension.get_or_insert(centroid.len());

        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes
            .push(MemoryNode::new(id, centroid, first, capacity, now));
        Ok(id)
    }

    /// Remove a node, preserving the order of the rest.
    pub fn remove(&mut self, id: NodeId) -> Option<MemoryNode> {
        let pos = self.position(id)?;
        Some(self.nodes.remove(pos))
    }

    /// The node with the oldest `last_update`; the earliest inserted wins ties.
    #[must_use]
    pub fn least_recently_updated(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .min_by_key(|n| n.last_update())
            .map(MemoryNode::id)
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut MemoryNode> {
        self.nodes.iter_mut()
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&MemoryNode) -> bool) -> Vec<NodeId> {
        let mut removed = Vec::new();
        self.nodes.retain(|n| {
            let kept = keep(n);
            if !kept {
                removed.push(n.id());
            }
            kept
        });
        removed
    }

    /// Validate a store that came from outside (snapshot) against `dimension`
    /// and the message bound.
    pub(crate) fn revalidate(
        &mut self,
        dimension: Option<usize>,
        capacity: usize,
    ) -> Result<(), MemoryError> {
        if let (Some(configured), Some(stored)) = (dimension, self.dimension) {
            if configured != stored {
                return Err(MemoryError::DimensionMismatch {
                    expected: configured,
                    actual: stored,
                });
            }
        }
        if self.dimension.is_none() {
            self.dimension = dimension.or_else(|| self.nodes.first().map(|n| n.centroid().len()));
        }

        for node in &self.nodes {
            self.check_vector(node.centroid())?;
        }
        for node in &mut self.nodes {
            node.enforce_capacity(capacity);
        }

        let max_id = self.nodes.iter().map(|n| n.id().0 + 1).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_first_insert_fixes_dimension() {
        let mut store = MemoryStore::new();
        assert_eq!(store.dimension(), None);

        store
            .insert(vec![1.0, 0.0, 0.0], Message::user("a"), 5, Utc::now())
            .unwrap();
        assert_eq!(store.dimension(), Some(3));

        let err = store
            .insert(vec![1.0, 0.0], Message::user("b"), 5, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            MemoryError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rejects_non_finite_and_empty() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.check_vector(&[]),
            Err(MemoryError::InvalidVector(_))
        ));
        assert!(matches!(
            store.check_vector(&[1.0, f32::NAN]),
            Err(MemoryError::InvalidVector(_))
        ));
    }

    #[test]
    fn test_ids_are_stable_across_removal() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let a = store.insert(vec![1.0], Message::user("a"), 5, now).unwrap();
        let b = store.insert(vec![1.0], Message::user("b"), 5, now).unwrap();
        let c = store.insert(vec![1.0], Message::user("c"), 5, now).unwrap();

        store.remove(a).unwrap();
        assert_eq!(store.position(b), Some(0));
        assert_eq!(store.get(c).unwrap().id(), c);

        let d = store.insert(vec![1.0], Message::user("d"), 5, now).unwrap();
        assert!(d > c);
    }

    #[test]
    fn test_least_recently_updated() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        store.insert(vec![1.0], Message::user("new"), 5, now).unwrap();
        let old = store
            .insert(vec![1.0], Message::user("old"), 5, now - Duration::hours(1))
            .unwrap();
        assert_eq!(store.least_recently_updated(), Some(old));
    }
}
