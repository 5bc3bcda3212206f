//! DeepSeek client
//!
//! OpenAI-compatible API. Streaming responses are server-sent events with a
//! JSON payload per `data:` line and a literal `data: [DONE]` terminator.

use super::framing::Framing;
use super::http::{self, build_agent, join_url, read_json};
use super::stream::{FrameStream, StreamFrame};
use super::{CancelToken, ChatMessage, GenerationOptions, LlmError, TokenUsage};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Default DeepSeek API host
pub const DEEPSEEK_DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// API version path segment
pub const DEEPSEEK_API_VERSION: &str = "v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepSeekModel {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub owned_by: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<DeepSeekModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeepSeekResponseMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeepSeekChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: DeepSeekResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Non-streaming chat completion
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeepSeekChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<DeepSeekChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl DeepSeekChatResponse {
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeepSeekDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeepSeekStreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: DeepSeekDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

/// One SSE payload of a streamed chat completion
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeepSeekStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<DeepSeekStreamChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

impl DeepSeekStreamChunk {
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .unwrap_or("")
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|reason| !reason.is_empty())
    }
}

impl StreamFrame for DeepSeekStreamChunk {
    fn is_terminal(&self) -> bool {
        self.finish_reason().is_some()
    }

    fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.message.clone())
    }
}

/// HTTP client for the DeepSeek API
pub struct DeepSeekClient {
    agent: ureq::Agent,
    base_url: RwLock<String>,
    api_key: RwLock<String>,
    request_timeout: Duration,
}

impl DeepSeekClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_timeouts(
            api_key,
            DEEPSEEK_DEFAULT_BASE_URL,
            http::DEFAULT_CONNECT_TIMEOUT,
            http::DEFAULT_REQUEST_TIMEOUT,
        )
    }

    pub fn with_timeouts(
        api_key: &str,
        base_url: &str,
        connect: Duration,
        request: Duration,
    ) -> Self {
        Self {
            agent: build_agent(connect),
            base_url: RwLock::new(base_url.to_string()),
            api_key: RwLock::new(api_key.to_string()),
            request_timeout: request,
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    pub fn set_base_url(&self, base_url: &str) {
        *self.base_url.write() = base_url.to_string();
    }

    /// Replace the API key; applies from the next call
    pub fn set_api_key(&self, api_key: &str) {
        *self.api_key.write() = api_key.trim().to_string();
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.read().is_empty()
    }

    fn url(&self, path: &str) -> String {
        join_url(
            &join_url(&self.base_url.read(), DEEPSEEK_API_VERSION),
            path,
        )
    }

    fn bearer(&self) -> Result<String, LlmError> {
        let key = self.api_key.read();
        if key.is_empty() {
            return Err(LlmError::config("DeepSeek API key is not set"));
        }
        Ok(format!("Bearer {}", key))
    }

    /// Check if the API answers the model listing with the current key
    pub fn check_status(&self) -> bool {
        let Ok(auth) = self.bearer() else {
            return false;
        };
        let url = self.url("models");
        match self
            .agent
            .get(&url)
            .set("Authorization", &auth)
            .timeout(http::STATUS_TIMEOUT)
            .call()
        {
            Ok(response) => response.status() == 200,
            Err(e) => {
                tracing::debug!(error = %e, "DeepSeek status check failed");
                false
            }
        }
    }

    pub fn list_models(&self) -> Result<Vec<DeepSeekModel>, LlmError> {
        let auth = self.bearer()?;
        let url = self.url("models");
        tracing::debug!("GET {}", url);

        let response = self
            .agent
            .get(&url)
            .set("Authorization", &auth)
            .timeout(self.request_timeout)
            .call()?;
        let models: ModelsResponse = read_json(response)?;
        Ok(models.data)
    }

    /// Key validation is a model listing that must succeed
    pub fn validate_api_key(&self) -> bool {
        self.list_models().is_ok()
    }

    pub fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<DeepSeekChatResponse, LlmError> {
        let auth = self.bearer()?;
        let url = self.url("chat/completions");
        tracing::debug!("POST {}", url);

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &auth)
            .timeout(self.request_timeout)
            .send_json(completion_body(model, messages, options, false))?;
        read_json(response)
    }

    pub fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        cancel: CancelToken,
    ) -> Result<FrameStream<DeepSeekStreamChunk>, LlmError> {
        let auth = self.bearer()?;
        let url = self.url("chat/completions");
        tracing::debug!("POST {} (stream)", url);

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &auth)
            .set("Accept", "text/event-stream")
            .send_json(completion_body(model, messages, options, true))?;
        Ok(FrameStream::new(
            http::into_body(response),
            Framing::Sse,
            cancel,
        ))
    }
}

fn completion_body(
    model: &str,
    messages: &[ChatMessage],
    options: &GenerationOptions,
    stream: bool,
) -> Value {
    let mut body = Map::new();
    body.insert("model".into(), Value::from(model));
    body.insert(
        "messages".into(),
        serde_json::to_value(messages).unwrap_or_default(),
    );
    body.insert("stream".into(), Value::from(stream));
    options.apply_to_deepseek(&mut body);
    Value::Object(body)
}

/// Rough token estimate: CJK ideographs count 1.5 each, other
/// whitespace-separated words count 1 each.
pub fn estimate_tokens(text: &str) -> usize {
    let is_cjk = |c: char| ('\u{4e00}'..='\u{9fff}').contains(&c);

    let cjk = text.chars().filter(|&c| is_cjk(c)).count();
    let rest: String = text.chars().filter(|&c| !is_cjk(c)).collect();
    let words = rest.split_whitespace().count();

    (cjk as f64 * 1.5 + words as f64).ceil() as usize
}
