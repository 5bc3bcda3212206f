//! Shared HTTP helpers for the provider clients

use super::stream::BodyReader;
use super::LlmError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default connect timeout for every provider call
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall timeout for non-streaming calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for lightweight health checks
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Build an agent with only a connect timeout.
///
/// Streaming reads stay unbounded; non-streaming calls set their own
/// per-request timeout.
pub fn build_agent(connect_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .build()
}

/// Join a base URL and an endpoint path without doubling slashes
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Read a whole response body as JSON
pub fn read_json<T: DeserializeOwned>(response: ureq::Response) -> Result<T, LlmError> {
    let body = response.into_string()?;
    serde_json::from_str(&body).map_err(|e| {
        LlmError::MalformedFrame(format!("{} (body: {})", e, truncate_for_log(&body)))
    })
}

/// Hand the response body over for incremental reading
pub fn into_body(response: ureq::Response) -> BodyReader {
    Box::new(response.into_reader())
}

fn truncate_for_log(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:11434/api/", "/tags"),
            "http://localhost:11434/api/tags"
        );
        assert_eq!(
            join_url("https://api.deepseek.com", "v1/models"),
            "https://api.deepseek.com/v1/models"
        );
    }

    #[test]
    fn test_truncate_for_log() {
        let long = "x".repeat(500);
        assert_eq!(truncate_for_log(&long).len(), 203);
        assert_eq!(truncate_for_log("short"), "short");
    }
}
