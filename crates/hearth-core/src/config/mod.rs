//! Configuration module for Hearth
//!
//! Handles loading and parsing of `.hearth.toml` configuration files
//! with support for environment variable expansion and overrides.

mod loader;
mod types;

pub use loader::{load_config, load_from_file, sample_config, user_config_path, ConfigError};
pub use types::{
    DeepSeekConfig, GenerationConfig, HearthConfig, LlmConfig, OllamaConfig, StorageConfig,
    TitleConfig,
};
