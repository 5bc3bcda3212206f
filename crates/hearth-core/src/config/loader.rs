//! Configuration loader with environment variable expansion
//!
//! Loads configuration from `.hearth.toml` in the project directory or the
//! user config directory.

use super::types::HearthConfig;
use crate::llm::ProviderKind;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Load configuration from various sources
///
/// Priority order:
/// 1. Project-level `.hearth.toml`
/// 2. User-level `~/.config/hearth/config.toml`
/// 3. Default configuration
///
/// Environment overrides are applied on top in every case.
pub fn load_config(project_dir: &Path) -> Result<HearthConfig, ConfigError> {
    let project_config = project_dir.join(".hearth.toml");
    if project_config.exists() {
        return load_from_file(&project_config);
    }

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            return load_from_file(&user_config);
        }
    }

    apply_env_overrides(HearthConfig::default())
}

/// Path of the user-level config file
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hearth").join("config.toml"))
}

/// Load configuration from a specific file
pub fn load_from_file(path: &Path) -> Result<HearthConfig, ConfigError> {
    tracing::debug!(path = %path.display(), "loading config");
    let content = std::fs::read_to_string(path)?;
    let mut config: HearthConfig = toml::from_str(&content)?;

    expand_env_vars(&mut config);

    apply_env_overrides(config)
}

/// Expand ${VAR} patterns in string values
fn expand_env_vars(config: &mut HearthConfig) {
    let Ok(env_regex) = Regex::new(r"\$\{([^}]+)\}") else {
        return;
    };

    let llm = &mut config.llm;
    llm.ollama.base_url = expand_string(&llm.ollama.base_url, &env_regex);
    llm.deepseek.base_url = expand_string(&llm.deepseek.base_url, &env_regex);
    if let Some(ref api_key) = llm.deepseek.api_key {
        llm.deepseek.api_key = Some(expand_string(api_key, &env_regex));
    }
    if let Some(ref dir) = config.storage.data_dir {
        let expanded = expand_string(&dir.to_string_lossy(), &env_regex);
        config.storage.data_dir = Some(PathBuf::from(expanded));
    }
}

/// Expand environment variables in a single string
fn expand_string(s: &str, regex: &Regex) -> String {
    regex
        .replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
}

/// Apply environment variable overrides
///
/// - OLLAMA_BASE_URL -> llm.ollama.base_url
/// - DEEPSEEK_API_KEY -> llm.deepseek.api_key
/// - DEEPSEEK_BASE_URL -> llm.deepseek.base_url
/// - HEARTH_PROVIDER -> llm.provider
/// - HEARTH_DATA_DIR -> storage.data_dir
fn apply_env_overrides(config: HearthConfig) -> Result<HearthConfig, ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

fn apply_overrides(
    mut config: HearthConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<HearthConfig, ConfigError> {
    let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(url) = var("OLLAMA_BASE_URL") {
        config.llm.ollama.base_url = url;
    }

    if let Some(key) = var("DEEPSEEK_API_KEY") {
        config.llm.deepseek.api_key = Some(key);
    }

    if let Some(url) = var("DEEPSEEK_BASE_URL") {
        config.llm.deepseek.base_url = url;
    }

    if let Some(provider) = var("HEARTH_PROVIDER") {
        config.llm.provider =
            provider
                .parse::<ProviderKind>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "HEARTH_PROVIDER".to_string(),
                    value: provider.clone(),
                })?;
    }

    if let Some(dir) = var("HEARTH_DATA_DIR") {
        config.storage.data_dir = Some(PathBuf::from(dir));
    }

    Ok(config)
}

/// Create a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Hearth Configuration
# Place this file in your project root as .hearth.toml
# or in ~/.config/hearth/config.toml for global settings

[llm]
# Provider used for new requests: ollama, deepseek
provider = "ollama"

# Timeout in seconds for non-streaming requests
timeout = 120

# Connect timeout in seconds
connect_timeout = 10

[llm.ollama]
# Must include the /api prefix
base_url = "http://localhost:11434/api"
default_model = "llama3.2"

[llm.deepseek]
base_url = "https://api.deepseek.com"
api_key = "${DEEPSEEK_API_KEY}"
default_model = "deepseek-chat"

[generation]
temperature = 0.8
top_k = 40
top_p = 0.9
repeat_penalty = 1.1
num_ctx = 2048
# max_tokens = 4096
# seed = 42
# stop = ["</s>"]

[storage]
# Chats and settings live here (default ~/.hearth)
# data_dir = "/path/to/data"

[title]
# Ask the model for a short title after the first exchange
enabled = true
# Length of the fallback title taken from the first message
max_chars = 20
"#
}
