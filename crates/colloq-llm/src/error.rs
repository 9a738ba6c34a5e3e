//! Errors from completion and embedding providers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with an error we do not classify further.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Transport failure or 5xx. Retried.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP 429. Retried with backoff.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// HTTP 401 or 403.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// An embedding came back with the wrong length.
    #[error("Embedding has {actual} dimensions, expected {expected}")]
    Dimensions { expected: usize, actual: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimit(message),
            500..=599 => Self::Network(format!("HTTP {status}: {message}")),
            _ => Self::Backend(format!("HTTP {status}: {message}")),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timed out"
        } else if err.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        Self::Network(format!("{kind}: {err}"))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
