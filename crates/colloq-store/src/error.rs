//! Error types for storage operations.

use std::time::Duration;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis returned an error or the connection failed.
    #[error("Durable backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A durable call exceeded its timeout.
    #[error("Durable backend timed out after {0:?}")]
    Timeout(Duration),

    /// The backend refused the call (used by the in-process fake).
    #[error("Durable backend unavailable: {0}")]
    Unavailable(String),

    /// A stored payload could not be decoded.
    #[error("Corrupt payload at '{key}': {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    /// A value could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
