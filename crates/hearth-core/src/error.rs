//! Error types for Hearth Core
//!
//! Storage, configuration and session operations return [`HearthError`].
//! Provider failures keep their own [`LlmError`] and are wrapped here.

use crate::llm::LlmError;
use thiserror::Error;

/// Result type for Hearth Core operations
pub type Result<T> = std::result::Result<T, HearthError>;

#[derive(Error, Debug)]
pub enum HearthError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider error
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A generation is already running for this conversation
    #[error("Chat {0} is busy generating")]
    Busy(String),
}

impl HearthError {
    pub fn config(msg: impl Into<String>) -> Self {
        HearthError::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        HearthError::NotFound(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        HearthError::InvalidOperation(msg.into())
    }

    pub fn busy(chat_id: impl Into<String>) -> Self {
        HearthError::Busy(chat_id.into())
    }

    /// True for errors the user can fix through settings
    pub fn is_configuration(&self) -> bool {
        match self {
            HearthError::Config(_) => true,
            HearthError::Llm(e) => e.is_configuration(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for HearthError {
    fn from(err: serde_json::Error) -> Self {
        HearthError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for HearthError {
    fn from(err: toml::de::Error) -> Self {
        HearthError::Config(err.to_string())
    }
}

impl From<crate::config::ConfigError> for HearthError {
    fn from(err: crate::config::ConfigError) -> Self {
        match err {
            crate::config::ConfigError::ReadError(e) => HearthError::Io(e),
            other => HearthError::Config(other.to_string()),
        }
    }
}
