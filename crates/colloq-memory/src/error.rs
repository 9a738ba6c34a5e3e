//! Error types for the memory service.
//!
//! The public [`ConversationMemory`](crate::ConversationMemory) operations
//! never surface these; they are used by the collaborators underneath it.

use std::time::Duration;

use thiserror::Error;

/// Errors raised below the memory façade.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Store(#[from] colloq_store::StoreError),

    #[error("Index error: {0}")]
    Index(#[from] colloq_index::IndexError),

    #[error("LLM error: {0}")]
    Llm(#[from] colloq_llm::LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] colloq_config::ConfigError),

    /// The summarizer produced nothing usable.
    #[error("Summarization failed: {0}")]
    Summarizer(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
