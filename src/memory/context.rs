//! Outgoing request assembly.

use super::node::MemoryNode;
use crate::llm::{Message, TokenService};

/// History entries included by [`build_messages`].
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// System entry, the new user message, then up to the last five messages of
/// `matched` in their original order with their stored roles.
#[must_use]
pub fn build_messages(
    system_prompt: &str,
    new_message: &str,
    matched: Option<&MemoryNode>,
) -> Vec<Message> {
    ContextAssembler::new()
        .assemble(system_prompt, new_message, matched)
        .messages
}

/// Messages ready to send plus how much node history made it in.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub messages: Vec<Message>,
    pub history_used: usize,
}

/// Configurable variant of [`build_messages`].
///
/// With a token budget the oldest history entries are dropped first; the
/// system and new-message pair is always kept even when it alone exceeds
/// the budget.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    history_limit: usize,
    token_budget: Option<usize>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            token_budget: None,
        }
    }

    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    #[must_use]
    pub fn with_token_budget(mut self, budget: Option<usize>) -> Self {
        self.token_budget = budget;
        self
    }

    #[must_use]
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn assemble(
        &self,
        system_prompt: &str,
        new_message: &str,
        matched: Option<&MemoryNode>,
    ) -> AssembledContext {
        let mut messages = vec![Message::system(system_prompt), Message::user(new_message)];

        let mut history: Vec<Message> = matched
            .map(|node| node.recent(self.history_limit).cloned().collect())
            .unwrap_or_default();

        if let Some(budget) = self.token_budget {
            let mut total = TokenService::estimate_messages(&messages)
                + history.iter().map(TokenService::estimate_message).sum::<usize>();
            let mut dropped = 0;
            while total > budget && dropped < history.len() {
                total -= TokenService::estimate_message(&history[dropped]);
                dropped += 1;
            }
            if dropped > 0 {
                tracing::debug!(dropped, budget, "Trimmed history to fit token budget");
                history = history.split_off(dropped);
            }
        }

        let history_used = history.len();
        messages.extend(history);
        AssembledContext {
            messages,
            history_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;
    use crate::memory::{MemoryConfig, MemoryManager};

    fn node_with(contents: &[&str]) -> MemoryManager {
        let mut memory = MemoryManager::new(MemoryConfig {
            max_messages: 10,
            ..Default::default()
        })
        .unwrap();
        for content in contents {
            memory
                .add_to_memory(&[1.0, 0.0], *content, MessageRole::User)
                .unwrap();
        }
        memory
    }

    #[test]
    fn test_no_match_gives_two_messages() {
        let messages = build_messages("sys", "hello", None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::system("sys"));
        assert_eq!(messages[1], Message::user("hello"));
    }

    #[test]
    fn test_history_capped_at_five() {
        let memory = node_with(&["1", "2", "3", "4", "5", "6", "7"]);
        let node = memory.store().iter().next();
        let messages = build_messages("sys", "new", node);
        let tail: Vec<&str> = messages[2..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(tail, vec!["3", "4", "5", "6", "7"]);
    }

    #[test]
    fn test_token_budget_drops_oldest_first() {
        let memory = node_with(&[
            "an old and rather long message about the weather last week",
            "short",
        ]);
        let node = memory.store().iter().next();
        let base = TokenService::estimate_messages(&[Message::system("sys"), Message::user("new")]);
        let budget = base + TokenService::estimate_message(&Message::user("short"));

        let ctx = ContextAssembler::new()
            .with_token_budget(Some(budget))
            .assemble("sys", "new", node);
        assert_eq!(ctx.history_used, 1);
        assert_eq!(ctx.messages[2].content, "short");
    }

    #[test]
    fn test_tiny_budget_keeps_system_and_user() {
        let memory = node_with(&["a", "b"]);
        let ctx = ContextAssembler::new()
            .with_token_budget(Some(1))
            .assemble("sys", "new", memory.store().iter().next());
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.history_used, 0);
    }
}
