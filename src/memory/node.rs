//! Memory node: one cluster of related conversational turns.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::Message;

/// Store-assigned handle of a node, stable for the node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Smallest centroid norm decay scales down to. Squared components stay
/// representable in `f32`, so cosine similarity still sees the direction.
pub const MIN_DECAYED_NORM: f32 = 1e-12;

/// A cluster of semantically related messages.
///
/// Invariants: `messages.len() <= capacity`, and the centroid length matches
/// the owning store's dimension (enforced by the store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    id: NodeId,
    centroid: Vec<f32>,
    messages: VecDeque<Message>,
    capacity: usize,
    last_update: DateTime<Utc>,
    /// Decay has been applied up to this instant.
    decayed_through: DateTime<Utc>,
    merge_count: u64,
}

impl MemoryNode {
    pub(crate) fn new(
        id: NodeId,
        centroid: Vec<f32>,
        first: Message,
        capacity: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let capacity = capacity.max(1);
        let mut messages = VecDeque::with_capacity(capacity);
        messages.push_back(first);
        Self {
            id,
            centroid,
            messages,
            capacity,
            last_update: now,
            decayed_through: now,
            merge_count: 1,
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn centroid(&self) -> &[f32] {
        &self.centroid
    }

    /// Retained messages, oldest first.
    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> + ExactSizeIterator {
        self.messages.iter()
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// The last `n` retained messages in their original order.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Message> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Messages ever merged into this node, evicted ones included.
    #[must_use]
    pub fn merge_count(&self) -> u64 {
        self.merge_count
    }

    /// L2 norm of the centroid.
    #[must_use]
    pub fn norm(&self) -> f32 {
        self.centroid.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Blend `query` into the centroid, append `message`, refresh timestamps.
    pub(crate) fn merge(
        &mut self,
        query: &[f32],
        message: Message,
        alpha: f32,
        now: DateTime<Utc>,
    ) {
        let keep = 1.0 - alpha;
        for (c, q) in self.centroid.iter_mut().zip(query) {
            *c = keep * *c + alpha * q;
        }
        self.push_message(message);
        self.last_update = now;
        self.decayed_through = now;
        self.merge_count += 1;
    }

    fn push_message(&mut self, message: Message) {
        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Scale the centroid by `exp(-rate * elapsed)` for the time not yet
    /// decayed. Returns the factor applied.
    ///
    /// The norm never drops below [`MIN_DECAYED_NORM`], so a long idle
    /// period fades a node without erasing its direction.
    pub(crate) fn decay(&mut self, rate: f64, now: DateTime<Utc>) -> f64 {
        let from = self.last_update.max(self.decayed_through);
        if now <= from {
            return 1.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let elapsed_secs = (now - from).num_microseconds().map_or_else(
            || (now - from).num_seconds() as f64,
            |us| us as f64 / 1_000_000.0,
        );
        let mut factor = (-rate * elapsed_secs).exp();
        let norm = f64::from(self.norm());
        if norm > 0.0 {
            factor = factor.max((f64::from(MIN_DECAYED_NORM) / norm).min(1.0));
        }
        #[allow(clippy::cast_possible_truncation)]
        let factor_f32 = factor as f32;
        for c in &mut self.centroid {
            *c *= factor_f32;
        }
        self.decayed_through = now;
        factor
    }

    /// Re-establish the message bound after loading from a snapshot.
    pub(crate) fn enforce_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn node(capacity: usize) -> MemoryNode {
        MemoryNode::new(
            NodeId(0),
            vec![1.0, 0.0],
            Message::user("m0"),
            capacity,
            Utc::now(),
        )
    }

    #[test]
    fn test_merge_blends_centroid() {
        let mut n = node(5);
        n.merge(&[0.0, 1.0], Message::user("m1"), 0.5, Utc::now());
        assert_eq!(n.centroid(), &[0.5, 0.5]);
        assert_eq!(n.message_count(), 2);
        assert_eq!(n.merge_count(), 2);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut n = node(2);
        n.merge(&[1.0, 0.0], Message::user("m1"), 0.5, Utc::now());
        n.merge(&[1.0, 0.0], Message::user("m2"), 0.5, Utc::now());
        let contents: Vec<&str> = n.messages().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);
    }

    #[test]
    fn test_recent_keeps_order() {
        let mut n = node(5);
        for i in 1..4 {
            n.merge(&[1.0, 0.0], Message::user(format!("m{i}")), 0.5, Utc::now());
        }
        let recent: Vec<&str> = n.recent(2).map(|m| m.content.as_str()).collect();
        assert_eq!(recent, vec!["m2", "m3"]);
        assert_eq!(n.recent(10).count(), 4);
    }

    #[test]
    fn test_decay_is_not_double_counted() {
        let start = Utc::now();
        let mut once = MemoryNode::new(NodeId(0), vec![1.0], Message::user("x"), 5, start);
        let mut twice = once.clone();

        once.decay(0.1, start + Duration::seconds(10));

        twice.decay(0.1, start + Duration::seconds(5));
        twice.decay(0.1, start + Duration::seconds(10));

        assert!((once.norm() - twice.norm()).abs() < 1e-6);
        assert!((once.norm() - (-1.0_f32).exp()).abs() < 1e-5);
    }

    #[test]
    fn test_long_idle_keeps_direction() {
        let start = Utc::now();
        let mut n = MemoryNode::new(NodeId(0), vec![0.6, 0.8], Message::user("x"), 5, start);
        n.decay(0.1, start + Duration::days(1));

        let norm = n.norm();
        assert!(norm > 0.0);
        assert!((norm - MIN_DECAYED_NORM).abs() < MIN_DECAYED_NORM * 1e-3);
        let direction: Vec<f32> = n.centroid().iter().map(|c| c / norm).collect();
        assert!((direction[0] - 0.6).abs() < 1e-4);
        assert!((direction[1] - 0.8).abs() < 1e-4);

        // already at the floor: further passes leave it alone
        let factor = n.decay(0.1, start + Duration::days(2));
        assert!((factor - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_decay_ignores_clock_going_backwards() {
        let start = Utc::now();
        let mut n = MemoryNode::new(NodeId(0), vec![2.0], Message::user("x"), 5, start);
        let factor = n.decay(0.1, start - Duration::seconds(30));
        assert!((factor - 1.0).abs() < f64::EPSILON);
        assert!((n.norm() - 2.0).abs() < f32::EPSILON);
    }
}
