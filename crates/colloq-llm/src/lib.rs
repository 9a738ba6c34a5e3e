//! LLM and embedding collaborators for Colloq.
//!
//! ```text
//! ┌────────────────────┐      ┌──────────────────────┐
//! │  SummaryCompactor  │─────▶│  LlmBackend (trait)  │──▶ OpenAiBackend / MockBackend
//! └────────────────────┘      └──────────────────────┘
//! ┌────────────────────┐      ┌──────────────────────┐
//! │   SemanticIndex    │─────▶│   Embedder (trait)   │──▶ OpenAiEmbedder / MockEmbedder
//! └────────────────────┘      └──────────────────────┘
//! ```

pub mod backend;
pub mod embeddings;
pub mod error;
mod http;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, MockBackend, SharedBackend, with_retry};
pub use embeddings::{Embedder, MockEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder};
pub use error::{LlmError, Result};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, Role, StopReason, Usage};
