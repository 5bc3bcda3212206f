//! Unified API facade
//!
//! Holds one client per provider plus the current provider selection and
//! routes every call to the resolved implementation. Calls that pass an
//! explicit provider ignore the current selection.

use super::deepseek::DeepSeekClient;
use super::ollama::{OllamaClient, PullProgress};
use super::stream::ChunkStream;
use super::{
    CancelToken, ChatMessage, GenerationOptions, LlmError, ProviderKind,
    SharedProvider, StreamOutcome, UnifiedModel, UnifiedStreamChunk,
};
use crate::config::LlmConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Facade over the Ollama and DeepSeek clients
pub struct ApiManager {
    /// Provider used when a call does not name one
    current: RwLock<ProviderKind>,

    ollama: Arc<OllamaClient>,

    deepseek: Arc<DeepSeekClient>,
}

impl Default for ApiManager {
    fn default() -> Self {
        Self::new(
            ProviderKind::Ollama,
            Arc::new(OllamaClient::default()),
            Arc::new(DeepSeekClient::new("")),
        )
    }
}

impl ApiManager {
    pub fn new(
        current: ProviderKind,
        ollama: Arc<OllamaClient>,
        deepseek: Arc<DeepSeekClient>,
    ) -> Self {
        Self {
            current: RwLock::new(current),
            ollama,
            deepseek,
        }
    }

    /// Build both clients from the `[llm]` configuration section
    pub fn from_config(config: &LlmConfig) -> Self {
        let connect = Duration::from_secs(config.connect_timeout);
        let request = Duration::from_secs(config.timeout);

        let ollama = OllamaClient::with_timeouts(&config.ollama.base_url, connect, request);
        let deepseek = DeepSeekClient::with_timeouts(
            config.deepseek.api_key.as_deref().unwrap_or_default(),
            &config.deepseek.base_url,
            connect,
            request,
        );

        Self::new(config.provider, Arc::new(ollama), Arc::new(deepseek))
    }

    // ========== Configuration ==========

    pub fn set_provider(&self, provider: ProviderKind) {
        tracing::info!(provider = %provider, "switching provider");
        *self.current.write() = provider;
    }

    /// Select a provider by name, rejecting unknown names
    pub fn set_provider_by_name(&self, name: &str) -> Result<ProviderKind, LlmError> {
        let provider: ProviderKind = name.parse()?;
        self.set_provider(provider);
        Ok(provider)
    }

    pub fn current_provider(&self) -> ProviderKind {
        *self.current.read()
    }

    pub fn set_ollama_base_url(&self, base_url: &str) {
        self.ollama.set_base_url(base_url);
    }

    pub fn set_deepseek_api_key(&self, api_key: &str) {
        self.deepseek.set_api_key(api_key);
    }

    pub fn set_deepseek_base_url(&self, base_url: &str) {
        self.deepseek.set_base_url(base_url);
    }

    pub fn ollama(&self) -> &Arc<OllamaClient> {
        &self.ollama
    }

    pub fn deepseek(&self) -> &Arc<DeepSeekClient> {
        &self.deepseek
    }

    /// Resolve the implementation for an explicit or the current provider
    pub fn provider(&self, provider: Option<ProviderKind>) -> SharedProvider {
        match provider.unwrap_or_else(|| self.current_provider()) {
            ProviderKind::Ollama => self.ollama.clone() as SharedProvider,
            ProviderKind::DeepSeek => self.deepseek.clone() as SharedProvider,
        }
    }

    // ========== Calls ==========

    pub fn check_status(&self, provider: Option<ProviderKind>) -> bool {
        self.provider(provider).check_status()
    }

    pub fn validate_config(&self, provider: ProviderKind) -> bool {
        self.provider(Some(provider)).validate()
    }

    pub fn get_models(&self, provider: Option<ProviderKind>) -> Result<Vec<UnifiedModel>, LlmError> {
        let target = self.provider(provider);
        target.list_models().map_err(|e| {
            tracing::warn!(provider = %target.kind(), error = %e, "model listing failed");
            e
        })
    }

    /// Non-streaming completion
    pub fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
        provider: Option<ProviderKind>,
    ) -> Result<String, LlmError> {
        self.provider(provider).chat(messages, model, options)
    }

    /// Start a streamed completion and hand back the lazy chunk sequence
    pub fn open_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
        cancel: CancelToken,
        provider: Option<ProviderKind>,
    ) -> Result<ChunkStream, LlmError> {
        let target = self.provider(provider);
        tracing::debug!(
            provider = %target.kind(),
            model = %model,
            turns = messages.len(),
            "opening chat stream"
        );
        target.chat_stream(messages, model, options, cancel)
    }

    /// Callback form of [`ApiManager::open_stream`]
    pub fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerationOptions,
        on_chunk: impl FnMut(UnifiedStreamChunk),
        cancel: CancelToken,
        provider: Option<ProviderKind>,
    ) -> Result<StreamOutcome, LlmError> {
        self.open_stream(messages, model, options, cancel, provider)?
            .drive(on_chunk)
    }

    // ========== Ollama model store ==========

    pub fn pull_model(
        &self,
        name: &str,
        on_progress: impl FnMut(PullProgress),
        cancel: CancelToken,
    ) -> Result<StreamOutcome, LlmError> {
        self.ollama.pull_model(name, on_progress, cancel)
    }

    pub fn delete_model(&self, name: &str) -> Result<(), LlmError> {
        self.ollama.delete_model(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_resolution() {
        let api = ApiManager::default();
        assert_eq!(api.current_provider(), ProviderKind::Ollama);
        assert_eq!(api.provider(None).kind(), ProviderKind::Ollama);
        assert_eq!(
            api.provider(Some(ProviderKind::DeepSeek)).kind(),
            ProviderKind::DeepSeek
        );

        api.set_provider(ProviderKind::DeepSeek);
        assert_eq!(api.provider(None).kind(), ProviderKind::DeepSeek);
    }

    #[test]
    fn test_unknown_provider_name_rejected() {
        let api = ApiManager::default();
        let err = api.set_provider_by_name("gemini").unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(api.current_provider(), ProviderKind::Ollama);
    }

    #[test]
    fn test_deepseek_without_key_fails_before_network() {
        let api = ApiManager::default();
        api.set_deepseek_base_url("http://127.0.0.1:1");
        let err = api
            .open_stream(
                &[ChatMessage::user("hi")],
                "deepseek-chat",
                &GenerationOptions::default(),
                CancelToken::new(),
                Some(ProviderKind::DeepSeek),
            )
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
