//! Notifications that chat sessions send to any UI
//!
//! They are serializable so a front end can forward them as JSON.

use crate::llm::{StreamOutcome, TokenUsage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// A placeholder assistant message was appended and a stream requested
    GenerationStarted {
        chat_id: String,
        message_id: String,
    },

    /// Streamed text appended to the in-flight assistant message
    AssistantDelta {
        chat_id: String,
        message_id: String,
        delta: String,
    },

    /// The stream ended, normally or through cancellation
    GenerationFinished {
        chat_id: String,
        message_id: String,
        outcome: StreamOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },

    /// The episode failed and the conversation was rolled back
    GenerationFailed { chat_id: String, message: String },

    TitleUpdated { chat_id: String, title: String },

    /// The conversation record was written to the store
    ChatSaved { chat_id: String },
}

impl Notification {
    pub fn chat_id(&self) -> &str {
        match self {
            Notification::GenerationStarted { chat_id, .. }
            | Notification::AssistantDelta { chat_id, .. }
            | Notification::GenerationFinished { chat_id, .. }
            | Notification::GenerationFailed { chat_id, .. }
            | Notification::TitleUpdated { chat_id, .. }
            | Notification::ChatSaved { chat_id } => chat_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_json() {
        let notification = Notification::GenerationFinished {
            chat_id: "c1".into(),
            message_id: "m1".into(),
            outcome: StreamOutcome::Cancelled,
            usage: None,
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "GenerationFinished");
        assert_eq!(json["outcome"], "cancelled");
        assert_eq!(notification.chat_id(), "c1");
    }
}
