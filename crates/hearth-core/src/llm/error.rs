//! LLM error types

use std::fmt;

/// Error type for provider and facade operations
#[derive(Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Network/connection error (unreachable host, DNS, TLS, reset mid-stream)
    Connection(String),

    /// Non-success HTTP status
    Http { status: u16, message: String },

    /// A response body or record that could not be decoded
    MalformedFrame(String),

    /// Unsupported provider, missing API key, bad base URL
    Configuration(String),

    /// Error reported by the backend inside an otherwise successful response
    Remote(String),
}

impl LlmError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        LlmError::Configuration(msg.into())
    }

    /// HTTP status code, if this error came from a non-success response
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error was raised before any network call was made
    pub fn is_configuration(&self) -> bool {
        matches!(self, LlmError::Configuration(_))
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Connection(msg) => write!(f, "Connection error: {}", msg),
            LlmError::Http { status, message } => {
                write!(f, "HTTP {}: {}", status, message)
            }
            LlmError::MalformedFrame(msg) => write!(f, "Malformed response: {}", msg),
            LlmError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            LlmError::Remote(msg) => write!(f, "Provider error: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

impl From<ureq::Error> for LlmError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                if status == 401 || status == 403 {
                    LlmError::Http {
                        status,
                        message: "Authentication failed".to_string(),
                    }
                } else {
                    let message = if body.trim().is_empty() {
                        "request failed".to_string()
                    } else {
                        body.trim().to_string()
                    };
                    LlmError::Http { status, message }
                }
            }
            ureq::Error::Transport(transport) => LlmError::Connection(transport.to_string()),
        }
    }
}

impl From<std::io::Error> for LlmError {
    fn from(err: std::io::Error) -> Self {
        LlmError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::MalformedFrame(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = LlmError::Http {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn test_configuration_flag() {
        assert!(LlmError::config("no key").is_configuration());
        assert!(!LlmError::Connection("refused".into()).is_configuration());
    }

    #[test]
    fn test_io_error_is_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(LlmError::from(io), LlmError::Connection(_)));
    }
}
