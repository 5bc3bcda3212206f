//! Runtime settings
//!
//! One global, user-mutable settings object. It starts from the loaded
//! [`HearthConfig`] and is overlaid with the entries persisted in the
//! store's settings table, one entry per field.

use crate::config::HearthConfig;
use crate::error::{HearthError, Result};
use crate::llm::{ApiManager, GenerationOptions, ProviderKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every settable key, in display order
pub const SETTING_KEYS: &[&str] = &[
    "api_provider",
    "api_base_url",
    "deepseek_api_key",
    "deepseek_base_url",
    "model",
    "temperature",
    "top_k",
    "top_p",
    "repeat_penalty",
    "num_ctx",
    "max_tokens",
    "seed",
    "stop",
    "options",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_provider: ProviderKind,

    /// Ollama base URL, including `/api`
    pub api_base_url: String,

    pub deepseek_api_key: String,

    pub deepseek_base_url: String,

    /// Selected model; the provider's configured default when unset
    pub model: Option<String>,

    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub repeat_penalty: f64,
    pub num_ctx: u32,
    pub max_tokens: Option<u32>,
    pub seed: Option<i64>,
    pub stop: Vec<String>,

    /// Extra backend options passed through to Ollama
    pub options: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&HearthConfig::default())
    }
}

impl Settings {
    /// Settings as seeded by configuration alone
    pub fn from_config(config: &HearthConfig) -> Self {
        let llm = &config.llm;
        let generation = &config.generation;
        Self {
            api_provider: llm.provider,
            api_base_url: llm.ollama.base_url.clone(),
            deepseek_api_key: llm.deepseek.api_key.clone().unwrap_or_default(),
            deepseek_base_url: llm.deepseek.base_url.clone(),
            model: llm.default_model(llm.provider).map(str::to_string),
            temperature: generation.temperature,
            top_k: generation.top_k,
            top_p: generation.top_p,
            repeat_penalty: generation.repeat_penalty,
            num_ctx: generation.num_ctx,
            max_tokens: generation.max_tokens,
            seed: generation.seed,
            stop: generation.stop.clone(),
            options: Map::new(),
        }
    }

    /// Overlay persisted entries.
    ///
    /// Unknown keys and values of the wrong shape are logged and skipped.
    pub fn apply_entries(&mut self, entries: &Map<String, Value>) {
        for (key, value) in entries {
            if let Err(e) = self.apply_value(key, value.clone()) {
                tracing::warn!(key = %key, error = %e, "ignoring stored setting");
            }
        }
    }

    /// Current value of one key
    pub fn get(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut fields)) => fields.remove(key),
            _ => None,
        }
    }

    /// All keys with their current values, in display order
    pub fn entries(&self) -> Vec<(&'static str, Value)> {
        SETTING_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }

    /// Parse `text` for `key` and apply it.
    ///
    /// Returns the JSON value to persist under `key`.
    pub fn set(&mut self, key: &str, text: &str) -> Result<Value> {
        let value = parse_value(key, text.trim())?;
        self.apply_value(key, value.clone())?;
        Ok(value)
    }

    fn apply_value(&mut self, key: &str, value: Value) -> Result<()> {
        if !SETTING_KEYS.contains(&key) {
            return Err(HearthError::config(format!("Unknown setting: {}", key)));
        }

        let Value::Object(mut fields) = serde_json::to_value(&*self)? else {
            return Err(HearthError::Serialization("settings are not an object".into()));
        };
        fields.insert(key.to_string(), value);
        *self = serde_json::from_value(Value::Object(fields))
            .map_err(|e| HearthError::config(format!("Invalid value for {}: {}", key, e)))?;
        Ok(())
    }

    /// Options for the next request
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: Some(self.temperature),
            top_k: Some(self.top_k),
            top_p: Some(self.top_p),
            repeat_penalty: Some(self.repeat_penalty),
            num_ctx: Some(self.num_ctx),
            max_tokens: self.max_tokens,
            seed: self.seed,
            stop: self.stop.clone(),
            extra: self.options.clone(),
        }
    }

    /// Push provider selection and connection settings into the facade
    pub fn apply_to(&self, api: &ApiManager) {
        api.set_provider(self.api_provider);
        api.set_ollama_base_url(&self.api_base_url);
        api.set_deepseek_api_key(&self.deepseek_api_key);
        api.set_deepseek_base_url(&self.deepseek_base_url);
    }

    /// API key with everything but the last four characters hidden
    pub fn masked_api_key(&self) -> String {
        let key = &self.deepseek_api_key;
        if key.is_empty() {
            return "(not set)".to_string();
        }
        let visible: String = key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{}", visible)
    }
}

/// Turn user text into the JSON shape of a settings field
fn parse_value(key: &str, text: &str) -> Result<Value> {
    let invalid = || HearthError::config(format!("Invalid value for {}: {:?}", key, text));
    let is_unset = text.is_empty() || text.eq_ignore_ascii_case("none");

    let value = match key {
        "api_provider" => {
            let provider: ProviderKind = text.parse()?;
            Value::from(provider.as_str())
        }
        "api_base_url" | "deepseek_base_url" => {
            if text.is_empty() {
                return Err(invalid());
            }
            Value::from(text.trim_end_matches('/'))
        }
        "deepseek_api_key" => Value::from(text),
        "model" => {
            if is_unset {
                Value::Null
            } else {
                Value::from(text)
            }
        }
        "temperature" => {
            let v: f64 = text.parse().map_err(|_| invalid())?;
            if !(0.0..=2.0).contains(&v) {
                return Err(invalid());
            }
            Value::from(v)
        }
        "top_p" => {
            let v: f64 = text.parse().map_err(|_| invalid())?;
            if !(0.0..=1.0).contains(&v) {
                return Err(invalid());
            }
            Value::from(v)
        }
        "repeat_penalty" => {
            let v: f64 = text.parse().map_err(|_| invalid())?;
            if v <= 0.0 {
                return Err(invalid());
            }
            Value::from(v)
        }
        "top_k" | "num_ctx" => {
            let v: u32 = text.parse().map_err(|_| invalid())?;
            Value::from(v)
        }
        "max_tokens" => {
            if is_unset {
                Value::Null
            } else {
                Value::from(text.parse::<u32>().map_err(|_| invalid())?)
            }
        }
        "seed" => {
            if is_unset {
                Value::Null
            } else {
                Value::from(text.parse::<i64>().map_err(|_| invalid())?)
            }
        }
        "stop" => Value::from(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
        ),
        "options" => {
            if is_unset {
                Value::Object(Map::new())
            } else {
                match serde_json::from_str::<Value>(text) {
                    Ok(obj @ Value::Object(_)) => obj,
                    _ => return Err(invalid()),
                }
            }
        }
        other => return Err(HearthError::config(format!("Unknown setting: {}", other))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults_follow_config() {
        let settings = Settings::default();
        assert_eq!(settings.api_provider, ProviderKind::Ollama);
        assert_eq!(settings.api_base_url, "http://localhost:11434/api");
        assert_eq!(settings.top_k, 40);
        assert_eq!(settings.num_ctx, 2048);
        assert_eq!(settings.model, None);
    }

    #[test]
    fn test_set_parses_and_returns_stored_value() {
        let mut settings = Settings::default();
        assert_eq!(settings.set("top_k", "20").unwrap(), json!(20));
        assert_eq!(settings.top_k, 20);

        assert_eq!(settings.set("api_provider", "DeepSeek").unwrap(), json!("deepseek"));
        assert_eq!(settings.api_provider, ProviderKind::DeepSeek);

        settings.set("stop", "</s>, ###").unwrap();
        assert_eq!(settings.stop, vec!["</s>".to_string(), "###".to_string()]);

        settings.set("max_tokens", "512").unwrap();
        assert_eq!(settings.max_tokens, Some(512));
        settings.set("max_tokens", "none").unwrap();
        assert_eq!(settings.max_tokens, None);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut settings = Settings::default();
        assert!(settings.set("colour", "blue").unwrap_err().is_configuration());
        assert!(settings.set("temperature", "hot").unwrap_err().is_configuration());
        assert!(settings.set("temperature", "3.5").is_err());
        assert!(settings.set("api_provider", "gemini").is_err());
        assert!(settings.set("options", "[1,2]").is_err());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_stored_entries_overlay() {
        let mut settings = Settings::default();
        let mut entries = Map::new();
        entries.insert("num_ctx".into(), json!(8192));
        entries.insert("model".into(), json!("llama3.2"));
        entries.insert("legacy_theme".into(), json!("dark"));
        entries.insert("top_k".into(), json!("not a number"));
        settings.apply_entries(&entries);

        assert_eq!(settings.num_ctx, 8192);
        assert_eq!(settings.model.as_deref(), Some("llama3.2"));
        assert_eq!(settings.top_k, 40);
    }

    #[test]
    fn test_generation_options_carry_extra() {
        let mut settings = Settings::default();
        settings.set("options", r#"{"mirostat": 2}"#).unwrap();
        settings.set("seed", "7").unwrap();
        let options = settings.generation_options();
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.extra.get("mirostat"), Some(&json!(2)));
    }

    #[test]
    fn test_apply_to_facade() {
        let mut settings = Settings::default();
        settings.set("api_provider", "deepseek").unwrap();
        settings.set("api_base_url", "http://gpu:11434/api/").unwrap();

        let api = ApiManager::default();
        settings.apply_to(&api);
        assert_eq!(api.current_provider(), ProviderKind::DeepSeek);
        assert_eq!(api.ollama().base_url(), "http://gpu:11434/api");
    }

    #[test]
    fn test_masked_key() {
        let mut settings = Settings::default();
        assert_eq!(settings.masked_api_key(), "(not set)");
        settings.set("deepseek_api_key", "sk-abcdef123456").unwrap();
        assert_eq!(settings.masked_api_key(), "****3456");
    }
}
