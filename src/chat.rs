//! Conversation log types for the chat widget.
//!
//! A conversation is an ordered, append-only sequence of turns. Messages are
//! immutable once appended; the log is only ever grown, never reordered or
//! edited, so a message's position is fixed for the lifetime of the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One turn in a conversation, either from the user or the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub is_user: bool,
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
            at: Utc::now(),
        }
    }
}

/// Append-only chat history, rendered top-to-bottom in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationLog {
    messages: Vec<ChatMessage>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_preserves_insertion_order() {
        let mut log = ConversationLog::new();
        log.push(ChatMessage::user("Hi"));
        log.push(ChatMessage::assistant("Hello"));
        log.push(ChatMessage::user("Show me a Bell state"));

        let texts: Vec<&str> = log.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi", "Hello", "Show me a Bell state"]);
    }

    #[test]
    fn author_flags_are_set() {
        assert!(ChatMessage::user("x").is_user);
        assert!(!ChatMessage::assistant("x").is_user);
    }
}
