//! Provider-neutral message, chunk and model types

use super::LlmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message as sent to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    DeepSeek,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Ollama, ProviderKind::DeepSeek];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::DeepSeek => "deepseek",
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "Ollama",
            ProviderKind::DeepSeek => "DeepSeek",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            other => Err(LlmError::config(format!("Unsupported provider: {}", other))),
        }
    }
}

/// Token accounting reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

/// One normalized streaming fragment.
///
/// Both providers' native frames are translated into this shape before they
/// reach a chat session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedStreamChunk {
    pub content: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Model listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedModel {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("Ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!(" deepseek ".parse::<ProviderKind>().unwrap(), ProviderKind::DeepSeek);

        let err = "openai".parse::<ProviderKind>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_chunk_skips_empty_optionals() {
        let chunk = UnifiedStreamChunk {
            content: "x".into(),
            done: false,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&chunk).unwrap(),
            r#"{"content":"x","done":false}"#
        );
    }
}
