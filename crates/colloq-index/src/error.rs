//! Error types for the semantic index.

use thiserror::Error;

/// Errors that can occur while indexing or querying.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The embedder could not produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(#[from] colloq_llm::LlmError),

    /// The blocking database task panicked or was cancelled.
    #[error("Index task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The index could not be opened.
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
