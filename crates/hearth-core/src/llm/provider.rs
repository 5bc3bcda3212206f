//! Provider capability trait and its two implementations

use super::deepseek::{DeepSeekClient, DeepSeekModel, DeepSeekStreamChunk};
use super::ollama::{OllamaChatChunk, OllamaClient, OllamaGenerateChunk, OllamaModel};
use super::stream::ChunkStream;
use super::{
    CancelToken, ChatMessage, GenerationOptions, LlmError, ProviderKind, Role, UnifiedModel,
    UnifiedStreamChunk,
};
use std::sync::Arc;

/// What every backend can do.
///
/// Implementations translate between the unified shapes and their native
/// request/response types.
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// True iff the backend answers its listing endpoint; never fails
    fn check_status(&self) -> bool;

    fn list_models(&self) -> Result<Vec<UnifiedModel>, LlmError>;

    /// Single-shot completion returning the full text
    fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;

    /// Start a streamed completion.
    ///
    /// Request and status errors are returned here; errors while reading
    /// the body arrive as items of the stream.
    fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
        cancel: CancelToken,
    ) -> Result<ChunkStream, LlmError>;

    /// Check that the provider is usable with its current configuration
    fn validate(&self) -> bool {
        self.check_status()
    }
}

/// Shared handle to a provider implementation
pub type SharedProvider = Arc<dyn ChatProvider>;

/// Ollama serves a lone user turn from `/generate` and everything else from `/chat`
fn single_prompt(messages: &[ChatMessage]) -> Option<&str> {
    match messages {
        [only] if only.role == Role::User => Some(only.content.as_str()),
        _ => None,
    }
}

impl From<OllamaGenerateChunk> for UnifiedStreamChunk {
    fn from(chunk: OllamaGenerateChunk) -> Self {
        let usage = chunk.usage();
        UnifiedStreamChunk {
            content: chunk.response,
            done: chunk.done,
            model: Some(chunk.model).filter(|m| !m.is_empty()),
            usage,
        }
    }
}

impl From<OllamaChatChunk> for UnifiedStreamChunk {
    fn from(chunk: OllamaChatChunk) -> Self {
        let usage = chunk.usage();
        UnifiedStreamChunk {
            content: chunk.content().to_string(),
            done: chunk.done,
            model: Some(chunk.model).filter(|m| !m.is_empty()),
            usage,
        }
    }
}

impl From<DeepSeekStreamChunk> for UnifiedStreamChunk {
    fn from(chunk: DeepSeekStreamChunk) -> Self {
        UnifiedStreamChunk {
            content: chunk.content().to_string(),
            done: chunk.finish_reason().is_some(),
            model: Some(chunk.model).filter(|m| !m.is_empty()),
            usage: chunk.usage,
        }
    }
}

impl From<OllamaModel> for UnifiedModel {
    fn from(model: OllamaModel) -> Self {
        let description = format!(
            "{} {}",
            model.details.family, model.details.parameter_size
        )
        .trim()
        .to_string();
        UnifiedModel {
            id: model.name.clone(),
            name: model.name,
            provider: ProviderKind::Ollama,
            size: Some(model.size).filter(|s| *s > 0),
            description: Some(description).filter(|d| !d.is_empty()),
        }
    }
}

impl From<DeepSeekModel> for UnifiedModel {
    fn from(model: DeepSeekModel) -> Self {
        UnifiedModel {
            description: Some(format!("DeepSeek {}", model.id)),
            name: model.id.clone(),
            id: model.id,
            provider: ProviderKind::DeepSeek,
            size: None,
        }
    }
}

impl ChatProvider for OllamaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn check_status(&self) -> bool {
        OllamaClient::check_status(self)
    }

    fn list_models(&self) -> Result<Vec<UnifiedModel>, LlmError> {
        Ok(OllamaClient::list_models(self)?
            .into_iter()
            .map(UnifiedModel::from)
            .collect())
    }

    fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        match single_prompt(messages) {
            Some(prompt) => Ok(self.generate(model, prompt, options)?.response),
            None => Ok(OllamaClient::chat(self, model, messages, options)?
                .content()
                .to_string()),
        }
    }

    fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
        cancel: CancelToken,
    ) -> Result<ChunkStream, LlmError> {
        match single_prompt(messages) {
            Some(prompt) => {
                let frames = self.generate_stream(model, prompt, options, cancel.clone())?;
                Ok(ChunkStream::from_frames(frames, cancel))
            }
            None => {
                let frames =
                    OllamaClient::chat_stream(self, model, messages, options, cancel.clone())?;
                Ok(ChunkStream::from_frames(frames, cancel))
            }
        }
    }
}

impl ChatProvider for DeepSeekClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    fn check_status(&self) -> bool {
        DeepSeekClient::check_status(self)
    }

    fn list_models(&self) -> Result<Vec<UnifiedModel>, LlmError> {
        Ok(DeepSeekClient::list_models(self)?
            .into_iter()
            .map(UnifiedModel::from)
            .collect())
    }

    fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        Ok(DeepSeekClient::chat(self, model, messages, options)?
            .content()
            .to_string())
    }

    fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
        cancel: CancelToken,
    ) -> Result<ChunkStream, LlmError> {
        let frames = DeepSeekClient::chat_stream(self, model, messages, options, cancel.clone())?;
        Ok(ChunkStream::from_frames(frames, cancel))
    }

    fn validate(&self) -> bool {
        self.validate_api_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_prompt_rule() {
        assert_eq!(single_prompt(&[ChatMessage::user("hi")]), Some("hi"));
        assert_eq!(single_prompt(&[ChatMessage::system("sys")]), None);
        assert_eq!(
            single_prompt(&[ChatMessage::user("a"), ChatMessage::assistant("b")]),
            None
        );
        assert_eq!(single_prompt(&[]), None);
    }

    #[test]
    fn test_ollama_model_mapping() {
        let model: OllamaModel = serde_json::from_str(
            r#"{"name":"llama3:8b","size":4661224676,"digest":"abc","details":{"family":"llama","parameter_size":"8.0B"}}"#,
        )
        .unwrap();
        let unified = UnifiedModel::from(model);
        assert_eq!(unified.id, "llama3:8b");
        assert_eq!(unified.provider, ProviderKind::Ollama);
        assert_eq!(unified.size, Some(4661224676));
        assert_eq!(unified.description.as_deref(), Some("llama 8.0B"));
    }

    #[test]
    fn test_ollama_model_without_details() {
        let unified = UnifiedModel::from(OllamaModel {
            name: "tiny".into(),
            ..Default::default()
        });
        assert_eq!(unified.description, None);
        assert_eq!(unified.size, None);
    }

    #[test]
    fn test_deepseek_model_mapping() {
        let unified = UnifiedModel::from(DeepSeekModel {
            id: "deepseek-chat".into(),
            ..Default::default()
        });
        assert_eq!(unified.name, "deepseek-chat");
        assert_eq!(unified.description.as_deref(), Some("DeepSeek deepseek-chat"));
    }

    #[test]
    fn test_deepseek_chunk_done_only_on_finish_reason() {
        let chunk: DeepSeekStreamChunk = serde_json::from_str(
            r#"{"model":"deepseek-chat","choices":[{"delta":{"content":"x"},"finish_reason":null}]}"#,
        )
        .unwrap();
        let unified = UnifiedStreamChunk::from(chunk);
        assert!(!unified.done);
        assert_eq!(unified.model.as_deref(), Some("deepseek-chat"));
    }
}
