//! Chat export and import formats
//!
//! A single chat exports as plain text. All chats export as one JSON
//! document that `import` reads back.

use super::types::{now_millis, Chat};
use crate::error::{HearthError, Result};
use crate::llm::Role;
use serde::{Deserialize, Serialize};

pub const EXPORT_VERSION: &str = "1.0.0";

/// Every chat in one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExport {
    pub version: String,

    /// Export time (Unix epoch milliseconds)
    pub timestamp: i64,

    pub chats: Vec<Chat>,
}

impl ChatExport {
    pub fn new(chats: Vec<Chat>) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            timestamp: now_millis(),
            chats,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse an export document.
    ///
    /// Only `chats` is required. Messages are marked done since no stream
    /// will ever finish them.
    pub fn from_json(json: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Document {
            #[serde(default)]
            version: Option<String>,
            #[serde(default)]
            timestamp: Option<i64>,
            chats: Option<Vec<Chat>>,
        }

        let document: Document = serde_json::from_str(json)
            .map_err(|e| HearthError::invalid_operation(format!("Invalid export file: {}", e)))?;
        let mut chats = document
            .chats
            .ok_or_else(|| HearthError::invalid_operation("Invalid export file: no chats"))?;

        for message in chats.iter_mut().flat_map(|c| c.messages.iter_mut()) {
            message.done = true;
        }

        Ok(Self {
            version: document.version.unwrap_or_else(|| EXPORT_VERSION.to_string()),
            timestamp: document.timestamp.unwrap_or_default(),
            chats,
        })
    }
}

/// `Role: content` per message, separated by blank lines
pub fn chat_to_text(chat: &Chat) -> String {
    chat.messages
        .iter()
        .map(|m| {
            let who = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{}: {}", who, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
