//! Configuration types for Hearth
//!
//! Defines the structure of `.hearth.toml` configuration.

use crate::llm::{GenerationOptions, ProviderKind, DEEPSEEK_DEFAULT_BASE_URL, OLLAMA_DEFAULT_BASE_URL};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HearthConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    /// Default generation parameters
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub title: TitleConfig,
}

/// LLM configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider used when none is chosen explicitly
    #[serde(default)]
    pub provider: ProviderKind,

    /// Request timeout in seconds for non-streaming calls
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connect timeout in seconds, applied to every call
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub deepseek: DeepSeekConfig,
}

fn default_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            ollama: OllamaConfig::default(),
            deepseek: DeepSeekConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Configured default model for a provider
    pub fn default_model(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::Ollama => self.ollama.default_model.as_deref(),
            ProviderKind::DeepSeek => self.deepseek.default_model.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL including the `/api` prefix
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default)]
    pub default_model: Option<String>,
}

fn default_ollama_url() -> String {
    OLLAMA_DEFAULT_BASE_URL.to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            default_model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepSeekConfig {
    #[serde(default = "default_deepseek_url")]
    pub base_url: String,

    /// API key (supports ${ENV_VAR} syntax)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_deepseek_model")]
    pub default_model: Option<String>,
}

fn default_deepseek_url() -> String {
    DEEPSEEK_DEFAULT_BASE_URL.to_string()
}

fn default_deepseek_model() -> Option<String> {
    Some("deepseek-chat".to_string())
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            base_url: default_deepseek_url(),
            api_key: None,
            default_model: default_deepseek_model(),
        }
    }
}

/// `[generation]` section
///
/// Unlike [`GenerationOptions`] every sampling field here has a concrete
/// default; `max_tokens`, `seed` and `stop` stay unset unless configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f64,

    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub seed: Option<i64>,

    #[serde(default)]
    pub stop: Vec<String>,
}

fn default_temperature() -> f64 {
    0.8
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f64 {
    0.9
}

fn default_repeat_penalty() -> f64 {
    1.1
}

fn default_num_ctx() -> u32 {
    2048
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
            num_ctx: default_num_ctx(),
            max_tokens: None,
            seed: None,
            stop: Vec::new(),
        }
    }
}

impl GenerationConfig {
    pub fn to_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: Some(self.temperature),
            top_k: Some(self.top_k),
            top_p: Some(self.top_p),
            repeat_penalty: Some(self.repeat_penalty),
            num_ctx: Some(self.num_ctx),
            max_tokens: self.max_tokens,
            seed: self.seed,
            stop: self.stop.clone(),
            extra: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; `~/.hearth` when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".hearth")))
    }
}

/// Automatic chat titles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleConfig {
    /// Ask the provider for a title after the first exchange
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Characters of the first message kept by the fallback title
    #[serde(default = "default_title_chars")]
    pub max_chars: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_title_chars() -> usize {
    20
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_chars: default_title_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: HearthConfig = toml::from_str(
            r#"
[llm]
provider = "deepseek"

[llm.deepseek]
api_key = "sk-test"

[generation]
temperature = 0.5
"#,
        )
        .unwrap();

        assert_eq!(config.llm.provider, ProviderKind::DeepSeek);
        assert_eq!(config.llm.timeout, 120);
        assert_eq!(config.llm.deepseek.base_url, DEEPSEEK_DEFAULT_BASE_URL);
        assert_eq!(config.llm.deepseek.default_model.as_deref(), Some("deepseek-chat"));
        assert_eq!(config.llm.ollama.base_url, OLLAMA_DEFAULT_BASE_URL);
        assert_eq!(config.generation.temperature, 0.5);
        assert_eq!(config.generation.top_k, 40);
        assert!(config.title.enabled);
        assert_eq!(config.title.max_chars, 20);
    }

    #[test]
    fn test_generation_to_options() {
        let options = GenerationConfig::default().to_options();
        assert_eq!(options.num_ctx, Some(2048));
        assert_eq!(options.max_tokens, None);
        assert!(options.stop.is_empty());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result: Result<HearthConfig, _> = toml::from_str("[llm]\nprovider = \"gemini\"\n");
        assert!(result.is_err());
    }
}
