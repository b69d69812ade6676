//! Associative conversational memory for a mood-aware diary assistant.
//!
//! Each user message is embedded and folded into a per-user memory of
//! *nodes*, clusters of related turns with a running centroid. Replies are
//! generated from the message plus the recent history of the node it
//! matched, so a conversation picks up where the topic last left off.
//!
//! # Architecture
//!
//! - **Memory**: merge-or-create by cosine similarity, time decay, snapshots
//! - **Embedding**: fastembed sentence models or a deterministic hashed embedder
//! - **LLM**: streaming `OpenAI`-compatible Chat Completions client
//! - **Session**: per-user memory, commit policy, feedback and regeneration
//!
//! # Modules
//!
//! - [`memory`]: nodes, store, matcher, manager, context assembly
//! - [`embedding`]: [`embedding::Embedder`] trait and implementations
//! - [`llm`]: [`llm::TextGenerator`] trait and the chat completions driver
//! - [`mood`]: mood detection and system prompt wording
//! - [`session`]: per-user sessions and the session store
//! - [`config`]: layered configuration and CLI
//! - [`telemetry`]: tracing subscriber setup

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod embedding;
pub mod llm;
pub mod memory;
pub mod mood;
pub mod session;
pub mod telemetry;
