use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::warn;

use super::Message;

/// Approximate per-message framing overhead in the chat format.
const MESSAGE_OVERHEAD: usize = 3;

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

#[derive(Debug)]
pub struct TokenService;

impl TokenService {
    fn bpe() -> Option<&'static CoreBPE> {
        CL100K
            .get_or_init(|| match cl100k_base() {
                Ok(bpe) => Some(bpe),
                Err(e) => {
                    warn!(error = %e, "cl100k_base unavailable, falling back to char estimate");
                    None
                }
            })
            .as_ref()
    }

    /// Estimate tokens for a string using cl100k_base (GPT-4/3.5 standard).
    pub fn estimate_string(content: &str) -> usize {
        match Self::bpe() {
            Some(bpe) => bpe.encode_with_special_tokens(content).len(),
            // ~4 chars per token
            None => content.len().div_ceil(4),
        }
    }

    /// Estimate tokens for a single message including framing overhead.
    pub fn estimate_message(message: &Message) -> usize {
        MESSAGE_OVERHEAD + Self::estimate_string(&message.content)
    }

    /// Estimate tokens for a list of messages.
    /// Every reply is primed with `<|start|>assistant<|message|>`, hence the trailing overhead.
    pub fn estimate_messages(messages: &[Message]) -> usize {
        messages.iter().map(Self::estimate_message).sum::<usize>() + MESSAGE_OVERHEAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_grows_with_content() {
        let short = TokenService::estimate_string("hello");
        let long = TokenService::estimate_string("hello there, how was the garden today?");
        assert!(short > 0);
        assert!(long > short);
    }

    #[test]
    fn test_estimate_messages_includes_overhead() {
        let messages = vec![Message::user("hi")];
        assert_eq!(
            TokenService::estimate_messages(&messages),
            TokenService::estimate_message(&messages[0]) + MESSAGE_OVERHEAD
        );
    }
}
