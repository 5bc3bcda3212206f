//! LLM integration module
//!
//! Streaming chat against two backends behind one facade:
//! - Ollama (local inference, NDJSON streams)
//! - DeepSeek (OpenAI-compatible API, SSE streams)
//!
//! Everything here is blocking. Streams are lazy iterators that check a
//! [`CancelToken`] before every network read.

mod cancel;
mod deepseek;
mod error;
mod framing;
mod http;
mod manager;
mod message;
mod ollama;
mod options;
mod provider;
mod stream;

pub use cancel::{CancelToken, StreamOutcome};
pub use error::LlmError;
pub use framing::{Framing, LineBuffer, Record, RecordReader};
pub use http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, STATUS_TIMEOUT};
pub use manager::ApiManager;
pub use message::{
    ChatMessage, ProviderKind, Role, TokenUsage, UnifiedModel, UnifiedStreamChunk,
};
pub use options::GenerationOptions;
pub use provider::{ChatProvider, SharedProvider};
pub use stream::{BodyReader, ChunkStream, FrameStream, StreamFrame};

// Provider implementations
pub use deepseek::{
    estimate_tokens, DeepSeekChatResponse, DeepSeekClient, DeepSeekModel, DeepSeekStreamChunk,
    DEEPSEEK_API_VERSION, DEEPSEEK_DEFAULT_BASE_URL,
};
pub use ollama::{
    OllamaChatChunk, OllamaClient, OllamaGenerateChunk, OllamaModel, OllamaModelDetails,
    PullProgress, OLLAMA_DEFAULT_BASE_URL,
};
