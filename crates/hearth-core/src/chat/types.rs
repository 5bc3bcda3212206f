//! Conversation type definitions
//!
//! Serializable for persistence and for any UI that wants to render them.

use crate::llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a conversation before one is generated
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Fresh opaque identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    pub role: Role,

    pub content: String,

    /// Creation time (Unix epoch milliseconds)
    pub timestamp: i64,

    /// False while a stream is still filling this message
    pub done: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: now_millis(),
            done: true,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Empty assistant message waiting for a stream
    pub fn placeholder() -> Self {
        Self {
            done: false,
            ..Self::new(Role::Assistant, "")
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        ChatMessage {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// One conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,

    pub title: String,

    /// Chronological; only ever appended to or truncated from the tail
    #[serde(default)]
    pub messages: Vec<Message>,

    pub created_at: i64,

    pub updated_at: i64,
}

impl Chat {
    pub fn new() -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            title: DEFAULT_CHAT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    /// History to send to a provider.
    ///
    /// Empty assistant messages (placeholders) are left out.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !(m.is_assistant() && m.content.is_empty()))
            .map(ChatMessage::from)
            .collect()
    }

    /// First user message, used for titles
    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_user())
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub updated_at: i64,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            message_count: chat.messages.len(),
            updated_at: chat.updated_at,
        }
    }
}
