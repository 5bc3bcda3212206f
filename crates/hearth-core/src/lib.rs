//! Hearth Core - backend library for Hearth
//!
//! This crate provides everything behind the chat front end:
//! - Provider clients for Ollama and DeepSeek with cancellable streaming
//! - A facade that routes calls to the selected provider
//! - Chat sessions that stream replies into conversations
//! - File-backed persistence for chats and settings
//! - Configuration loading
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  send/stop   ┌─────────────┐   stream   ┌────────────┐
//! │   Any UI     │ ───────────→ │ ChatManager │ ─────────→ │ ApiManager │
//! │              │ ←─────────── │ ChatSession │ ←───────── │ providers  │
//! └──────────────┘ Notification └─────────────┘   chunks   └────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hearth_core::{config, ChatManager, Notification};
//!
//! let manager = ChatManager::new(config::load_config(&cwd)?)?;
//! manager.update_setting("model", "llama3.2")?;
//! manager.send("Why is the sky blue?")?;
//!
//! while let Ok(notif) = manager.notifications().try_recv() {
//!     if let Notification::AssistantDelta { delta, .. } = notif {
//!         print!("{}", delta);
//!     }
//! }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod notifications;
pub mod settings;

pub use chat::{ChatManager, ChatSession, ChatStore, GenerationRequest};
pub use config::HearthConfig;
pub use error::{HearthError, Result};
pub use notifications::Notification;
pub use settings::Settings;

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
