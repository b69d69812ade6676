//! Text-generation client and the chat message model.
//!
//! The memory core never talks to a model directly. It hands an ordered list
//! of [`Message`]s to a [`TextGenerator`] and gets text back. The only
//! production implementation is [`ChatCompletionsDriver`], which speaks the
//! `OpenAI` Chat Completions protocol (`/v1/chat/completions`) and works with
//! any compatible provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use gng_memory::llm::{ChatCompletionsDriver, LlmSettings, Message, Provider, TextGenerator};
//!
//! let settings = LlmSettings {
//!     base_url: "https://api.openai.com".to_string(),
//!     api_key: Some("sk-...".to_string()),
//!     model: "gpt-3.5-turbo".to_string(),
//!     provider: Provider::OpenAI,
//! };
//! let driver = ChatCompletionsDriver::new(settings);
//! let reply = driver.generate(&[Message::user("Hello")]).await?;
//! ```

pub mod chat_completions;
pub mod provider;
pub mod tokens;

pub use chat_completions::ChatCompletionsDriver;
pub use provider::Provider;
pub use tokens::TokenService;

use serde::{Deserialize, Serialize};

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-3.5-turbo`).
    pub model: String,
    /// Provider type (auto-detected from `base_url` by the config loader).
    pub provider: Provider,
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `{role, content}` record, both in memory nodes and in outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Failures of the external text-generation service.
///
/// Retry and backoff are the caller's business; the session only reports
/// which turn failed.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Transport-level failure (DNS, TLS, connection reset, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status (rate limit, bad key, ...).
    #[error("Service returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// A streamed frame could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The call did not finish within the configured timeout.
    #[error("Generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The stream finished without producing any text.
    #[error("Service returned an empty reply")]
    EmptyReply,
}

/// Trait for text-generation backends.
///
/// Implementations receive the full, already-assembled conversation and
/// return the assistant's reply text.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync + std::fmt::Debug {
    /// Generate a reply for `messages`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply is empty.
    async fn generate(&self, messages: &[Message]) -> Result<String, GenerationError>;
}
