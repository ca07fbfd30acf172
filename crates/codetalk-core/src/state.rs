//! UI-agnostic conversation state
//!
//! This module contains the chat log shared by any front end. Messages are
//! append-only; the only in-place edit is resolving the pending placeholder.

use serde::{Deserialize, Serialize};

/// Text shown for an agent reply that is still in flight
pub const PLACEHOLDER_TEXT: &str = "...";

/// Reply shown when a turn fails for any reason
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error.";

/// Stable identity of a message within one conversation
pub type MessageId = u64;

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    User,
    Agent,
}

/// A chat message in the agent conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub author: Author,
    pub text: String,
}

impl ChatMessage {
    pub fn is_placeholder(&self) -> bool {
        self.author == Author::Agent && self.text == PLACEHOLDER_TEXT
    }
}

/// Ordered chat log; insertion order is display order
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    next_id: MessageId,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, author: Author, text: impl Into<String>) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id,
            author,
            text: text.into(),
        });
        id
    }

    /// Replace a pending placeholder's text. Returns false if `id` is not a
    /// placeholder (already resolved, or gone after a clear).
    pub fn resolve_placeholder(&mut self, id: MessageId, text: impl Into<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(msg) if msg.is_placeholder() => {
                msg.text = text.into();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every message. Ids keep increasing so stale replies never match.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_increasing_ids() {
        let mut log = Conversation::new();
        let a = log.push(Author::User, "hi");
        let b = log.push(Author::Agent, PLACEHOLDER_TEXT);
        assert!(b > a);
        assert_eq!(log.len(), 2);
        assert!(log.get(b).unwrap().is_placeholder());
    }

    #[test]
    fn test_resolve_placeholder_only_once() {
        let mut log = Conversation::new();
        let id = log.push(Author::Agent, PLACEHOLDER_TEXT);
        assert!(log.resolve_placeholder(id, "done"));
        assert!(!log.resolve_placeholder(id, "again"));
        assert_eq!(log.get(id).unwrap().text, "done");
    }

    #[test]
    fn test_resolve_ignores_user_messages() {
        let mut log = Conversation::new();
        let id = log.push(Author::User, PLACEHOLDER_TEXT);
        assert!(!log.resolve_placeholder(id, "nope"));
    }

    #[test]
    fn test_ids_survive_clear() {
        let mut log = Conversation::new();
        let old = log.push(Author::Agent, PLACEHOLDER_TEXT);
        log.clear();
        let new = log.push(Author::Agent, PLACEHOLDER_TEXT);
        assert_ne!(old, new);
        assert!(!log.resolve_placeholder(old, "stale"));
    }
}
