//! Generation parameters shared by both providers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sampling and length parameters for a single request.
///
/// Every field is optional; unset fields are left out of the request so the
/// backend applies its own default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,

    /// Context window (Ollama only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,

    /// Completion length cap (DeepSeek only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Extra backend options passed through verbatim (Ollama `options` only)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl GenerationOptions {
    /// Build the Ollama `options` object
    pub fn to_ollama_options(&self) -> Value {
        let mut options = self.extra.clone();
        insert_opt(&mut options, "temperature", self.temperature);
        insert_opt(&mut options, "top_k", self.top_k);
        insert_opt(&mut options, "top_p", self.top_p);
        insert_opt(&mut options, "repeat_penalty", self.repeat_penalty);
        insert_opt(&mut options, "num_ctx", self.num_ctx);
        insert_opt(&mut options, "seed", self.seed);
        if !self.stop.is_empty() {
            options.insert("stop".into(), Value::from(self.stop.clone()));
        }
        Value::Object(options)
    }

    /// Add the OpenAI-style top-level fields to a DeepSeek request body
    pub fn apply_to_deepseek(&self, body: &mut Map<String, Value>) {
        insert_opt(body, "temperature", self.temperature);
        insert_opt(body, "max_tokens", self.max_tokens);
        insert_opt(body, "top_p", self.top_p);
        insert_opt(body, "seed", self.seed);
        if !self.stop.is_empty() {
            body.insert("stop".into(), Value::from(self.stop.clone()));
        }
    }
}

fn insert_opt<T: Into<Value>>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ollama_options_skip_unset() {
        let opts = GenerationOptions {
            temperature: Some(0.5),
            num_ctx: Some(2048),
            max_tokens: Some(100),
            ..Default::default()
        };
        assert_eq!(
            opts.to_ollama_options(),
            json!({"temperature": 0.5, "num_ctx": 2048})
        );
    }

    #[test]
    fn test_sampling_values_sent_as_typed() {
        let opts = GenerationOptions {
            temperature: Some(0.7),
            top_p: Some(0.9),
            repeat_penalty: Some(1.1),
            ..Default::default()
        };
        let body = serde_json::to_string(&opts.to_ollama_options()).unwrap();
        assert!(body.contains("\"temperature\":0.7"), "{}", body);
        assert!(body.contains("\"top_p\":0.9"), "{}", body);
        assert!(body.contains("\"repeat_penalty\":1.1"), "{}", body);

        let mut fields = Map::new();
        opts.apply_to_deepseek(&mut fields);
        assert_eq!(fields["temperature"], json!(0.7));
    }

    #[test]
    fn test_ollama_known_fields_override_extra() {
        let mut extra = Map::new();
        extra.insert("mirostat".into(), json!(2));
        extra.insert("top_k".into(), json!(1));
        let opts = GenerationOptions {
            top_k: Some(40),
            extra,
            ..Default::default()
        };
        assert_eq!(opts.to_ollama_options(), json!({"mirostat": 2, "top_k": 40}));
    }

    #[test]
    fn test_deepseek_fields() {
        let opts = GenerationOptions {
            temperature: Some(1.0),
            max_tokens: Some(50),
            num_ctx: Some(4096),
            stop: vec!["\n\n".into()],
            ..Default::default()
        };
        let mut body = Map::new();
        opts.apply_to_deepseek(&mut body);
        assert_eq!(
            Value::Object(body),
            json!({"temperature": 1.0, "max_tokens": 50, "stop": ["\n\n"]})
        );
    }
}
