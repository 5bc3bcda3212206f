//! Conversations: types, persistence, the session controller and the
//! manager that ties them together.

mod export;
mod manager;
mod session;
mod storage;
mod title;
mod types;

pub use export::{chat_to_text, ChatExport, EXPORT_VERSION};
pub use manager::ChatManager;
pub use session::{ChatSession, GenerationRequest, SessionContext};
pub use storage::ChatStore;
pub use title::{clean_title, fallback_title, title_prompt};
pub use types::{new_id, now_millis, Chat, ChatSummary, Message, DEFAULT_CHAT_TITLE};
