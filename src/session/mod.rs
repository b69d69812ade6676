//! Per-user conversational sessions.
//!
//! A session owns one user's [`MemoryManager`](crate::memory::MemoryManager)
//! and runs turns against it: embed, pick a mood, merge into memory,
//! assemble context and call the generator. Memory is locked only around
//! memory operations; the generation call runs unlocked under a timeout so
//! one slow reply never blocks another user.
//!
//! # Architecture
//!
//! - [`Session`]: a single user's memory plus feedback log
//! - [`SessionStore`]: thread-safe map of user id to session
//! - [`CommitPolicy`]: when the user message is merged into memory
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo(store: gng_memory::session::SessionStore) -> Result<(), Box<dyn std::error::Error>> {
//! let session = store.get_or_create("alice");
//! let turn = session.respond("I watched a gardening show last night").await?;
//! println!("{} (node {:?}, merged: {})", turn.reply, turn.node, turn.merged);
//! # Ok(())
//! # }
//! ```

mod thread;

pub use thread::{Session, SessionServices, SessionStore};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingError;
use crate::llm::GenerationError;
use crate::memory::{MemoryError, NodeId, context::DEFAULT_HISTORY_LIMIT};
use crate::mood::Mood;

/// Appended to the user message when a reply is regenerated.
pub const REGENERATE_SUFFIX: &str = " The previous response was not helpful.";

/// Ratings at or below this ask for a regenerated reply.
pub const UNHELPFUL_AT_OR_BELOW: u8 = 2;

/// When a turn's user message is merged into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Merge first, then build context from the affected node. A failed
    /// generation still leaves the message in memory.
    #[default]
    BeforeGenerate,
    /// Build context from the current best match and merge only once a
    /// reply has been produced.
    AfterReply,
}

/// Turn behaviour shared by every session of a store.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub commit_policy: CommitPolicy,
    pub generation_timeout: Duration,
    /// Ask the model to help the user build self efficacy.
    pub coaching: bool,
    pub history_limit: usize,
    pub token_budget: Option<usize>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            commit_policy: CommitPolicy::default(),
            generation_timeout: Duration::from_secs(60),
            coaching: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            token_budget: None,
        }
    }
}

/// Outcome of a successful turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub reply: String,
    pub mood: Mood,
    /// Node the message was merged into, or whose history was used.
    pub node: Option<NodeId>,
    /// `true` when an existing node was matched rather than created.
    pub merged: bool,
    pub history_used: usize,
}

/// A stored topic close to a query, as listed by [`Session::recall`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recollection {
    pub node: NodeId,
    pub similarity: f32,
    pub message_count: usize,
    /// Most recent message kept by the node.
    pub latest: Option<String>,
}

/// A user rating of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub score: u8,
    pub at: DateTime<Utc>,
}

impl Feedback {
    #[must_use]
    pub fn is_unhelpful(&self) -> bool {
        self.score <= UNHELPFUL_AT_OR_BELOW
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Feedback score must be between 1 and 5, got {0}")]
    InvalidFeedback(u8),
}
