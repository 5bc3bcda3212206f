//! Ollama client
//!
//! Talks to a local Ollama instance. The base URL includes the `/api`
//! prefix, e.g. `http://localhost:11434/api`. Streaming endpoints answer
//! with newline-delimited JSON.

use super::framing::Framing;
use super::http::{self, build_agent, join_url, read_json};
use super::stream::{FrameStream, StreamFrame};
use super::{CancelToken, ChatMessage, GenerationOptions, LlmError, StreamOutcome, TokenUsage};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Default Ollama API root
pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434/api";

/// Installed model as reported by `GET /tags`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: OllamaModelDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OllamaModelDetails {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub families: Option<Vec<String>>,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

/// Frame of `POST /generate` (also the non-streaming response shape)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OllamaGenerateChunk {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OllamaChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Frame of `POST /chat` (also the non-streaming response shape)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OllamaChatChunk {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub message: Option<OllamaChatMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OllamaChatChunk {
    pub fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }
}

/// Progress frame of `POST /pull`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PullProgress {
    /// Completed fraction in `0.0..=1.0`, when the layer size is known
    pub fn fraction(&self) -> Option<f64> {
        match (self.completed, self.total) {
            (Some(completed), Some(total)) if total > 0 => {
                Some((completed as f64 / total as f64).min(1.0))
            }
            _ => None,
        }
    }
}

fn usage_of(prompt: Option<u32>, completion: Option<u32>) -> Option<TokenUsage> {
    if prompt.is_none() && completion.is_none() {
        return None;
    }
    let total = match (prompt, completion) {
        (Some(p), Some(c)) => Some(p.saturating_add(c)),
        _ => None,
    };
    Some(TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

impl OllamaGenerateChunk {
    pub fn usage(&self) -> Option<TokenUsage> {
        usage_of(self.prompt_eval_count, self.eval_count)
    }
}

impl OllamaChatChunk {
    pub fn usage(&self) -> Option<TokenUsage> {
        usage_of(self.prompt_eval_count, self.eval_count)
    }
}

impl StreamFrame for OllamaGenerateChunk {
    fn is_terminal(&self) -> bool {
        self.done
    }

    fn error_message(&self) -> Option<String> {
        self.error.clone()
    }
}

impl StreamFrame for OllamaChatChunk {
    fn is_terminal(&self) -> bool {
        self.done
    }

    fn error_message(&self) -> Option<String> {
        self.error.clone()
    }
}

impl StreamFrame for PullProgress {
    fn is_terminal(&self) -> bool {
        self.status == "success"
    }

    fn error_message(&self) -> Option<String> {
        self.error.clone()
    }
}

/// HTTP client for the Ollama API
pub struct OllamaClient {
    agent: ureq::Agent,

    /// API root, read once at the start of every call
    base_url: RwLock<String>,

    /// Overall timeout for non-streaming calls
    request_timeout: Duration,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(OLLAMA_DEFAULT_BASE_URL)
    }
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeouts(
            base_url,
            http::DEFAULT_CONNECT_TIMEOUT,
            http::DEFAULT_REQUEST_TIMEOUT,
        )
    }

    pub fn with_timeouts(base_url: &str, connect: Duration, request: Duration) -> Self {
        Self {
            agent: build_agent(connect),
            base_url: RwLock::new(base_url.to_string()),
            request_timeout: request,
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    /// Point the client at another server; applies from the next call
    pub fn set_base_url(&self, base_url: &str) {
        *self.base_url.write() = base_url.to_string();
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url.read(), path)
    }

    /// Check if Ollama is reachable
    pub fn check_status(&self) -> bool {
        let url = self.url("tags");
        match self.agent.get(&url).timeout(http::STATUS_TIMEOUT).call() {
            Ok(response) => response.status() == 200,
            Err(e) => {
                tracing::debug!(error = %e, "Ollama status check failed");
                false
            }
        }
    }

    /// List installed models
    pub fn list_models(&self) -> Result<Vec<OllamaModel>, LlmError> {
        let url = self.url("tags");
        tracing::debug!("GET {}", url);

        let response = self.agent.get(&url).timeout(self.request_timeout).call()?;
        let tags: TagsResponse = read_json(response)?;
        Ok(tags.models)
    }

    /// Single-prompt completion, non-streaming
    pub fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<OllamaGenerateChunk, LlmError> {
        let url = self.url("generate");
        tracing::debug!("POST {}", url);

        let body = generate_body(model, prompt, options, false);
        let response = self
            .agent
            .post(&url)
            .timeout(self.request_timeout)
            .send_json(body)?;
        let reply: OllamaGenerateChunk = read_json(response)?;
        match reply.error {
            Some(message) => Err(LlmError::Remote(message)),
            None => Ok(reply),
        }
    }

    /// Multi-turn chat, non-streaming
    pub fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<OllamaChatChunk, LlmError> {
        let url = self.url("chat");
        tracing::debug!("POST {}", url);

        let body = chat_body(model, messages, options, false);
        let response = self
            .agent
            .post(&url)
            .timeout(self.request_timeout)
            .send_json(body)?;
        let reply: OllamaChatChunk = read_json(response)?;
        match reply.error {
            Some(message) => Err(LlmError::Remote(message)),
            None => Ok(reply),
        }
    }

    /// Single-prompt completion, streamed
    pub fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
        cancel: CancelToken,
    ) -> Result<FrameStream<OllamaGenerateChunk>, LlmError> {
        let url = self.url("generate");
        tracing::debug!("POST {} (stream)", url);

        let response = self
            .agent
            .post(&url)
            .send_json(generate_body(model, prompt, options, true))?;
        Ok(FrameStream::new(
            http::into_body(response),
            Framing::Ndjson,
            cancel,
        ))
    }

    /// Multi-turn chat, streamed
    pub fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        cancel: CancelToken,
    ) -> Result<FrameStream<OllamaChatChunk>, LlmError> {
        let url = self.url("chat");
        tracing::debug!("POST {} (stream)", url);

        let response = self
            .agent
            .post(&url)
            .send_json(chat_body(model, messages, options, true))?;
        Ok(FrameStream::new(
            http::into_body(response),
            Framing::Ndjson,
            cancel,
        ))
    }

    /// Download a model into the local store, reporting progress frames
    pub fn pull_model(
        &self,
        name: &str,
        on_progress: impl FnMut(PullProgress),
        cancel: CancelToken,
    ) -> Result<StreamOutcome, LlmError> {
        let url = self.url("pull");
        tracing::info!(model = %name, "pulling model");

        let response = self
            .agent
            .post(&url)
            .send_json(json!({ "name": name, "stream": true }))?;
        let frames: FrameStream<PullProgress> =
            FrameStream::new(http::into_body(response), Framing::Ndjson, cancel);
        frames.drive(on_progress)
    }

    /// Remove a model from the local store
    pub fn delete_model(&self, name: &str) -> Result<(), LlmError> {
        let url = self.url("delete");
        tracing::info!(model = %name, "deleting model");

        self.agent
            .delete(&url)
            .timeout(self.request_timeout)
            .send_json(json!({ "name": name }))?;
        Ok(())
    }
}

fn generate_body(
    model: &str,
    prompt: &str,
    options: &GenerationOptions,
    stream: bool,
) -> serde_json::Value {
    json!({
        "model": model,
        "prompt": prompt,
        "stream": stream,
        "options": options.to_ollama_options(),
    })
}

fn chat_body(
    model: &str,
    messages: &[ChatMessage],
    options: &GenerationOptions,
    stream: bool,
) -> serde_json::Value {
    json!({
        "model": model,
        "messages": messages,
        "stream": stream,
        "options": options.to_ollama_options(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_body_shape() {
        let body = chat_body(
            "llama3",
            &[ChatMessage::system("be brief"), ChatMessage::user("hi")],
            &GenerationOptions::default(),
            true,
        );
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"], json!({}));
    }

    #[test]
    fn test_usage_from_final_frame() {
        let chunk: OllamaGenerateChunk = serde_json::from_str(
            r#"{"model":"m","response":"","done":true,"prompt_eval_count":12,"eval_count":30}"#,
        )
        .unwrap();
        let usage = chunk.usage().unwrap();
        assert_eq!(usage.total_tokens, Some(42));
        assert!(OllamaGenerateChunk::default().usage().is_none());
    }

    #[test]
    fn test_pull_fraction() {
        let progress = PullProgress {
            status: "downloading".into(),
            total: Some(200),
            completed: Some(50),
            ..Default::default()
        };
        assert_eq!(progress.fraction(), Some(0.25));
        assert_eq!(PullProgress::default().fraction(), None);
    }

    #[test]
    fn test_pull_success_is_terminal() {
        let done: PullProgress = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(done.is_terminal());
    }

    #[test]
    fn test_base_url_update() {
        let client = OllamaClient::default();
        assert_eq!(client.url("tags"), "http://localhost:11434/api/tags");
        client.set_base_url("http://gpu-box:11434/api/");
        assert_eq!(client.url("tags"), "http://gpu-box:11434/api/tags");
    }
}
