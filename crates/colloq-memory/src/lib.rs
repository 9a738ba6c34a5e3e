//! Conversation memory for a chat assistant.
//!
//! ```text
//!                 ┌──────────────────────┐
//!  add_message ─▶ │  ConversationMemory  │ ─▶ get_recent_history / get_window_history
//!                 └──────────┬───────────┘ ─▶ get_semantic_context
//!                            │             ─▶ get_compacted_history
//!        ┌───────────────────┼────────────────────┐
//!        ▼                   ▼                    ▼
//!   HybridStore        SemanticIndex       SummaryCompactor
//!  (Redis | memory)    (sqlite-vec)        (LLM | fallback)
//! ```
//!
//! Nothing here returns an error to the caller: a failed tier degrades to the
//! volatile store, a failed index to empty recall, and a failed summarizer to
//! the raw transcript.

pub mod compactor;
pub mod error;
pub mod format;
pub mod memory;
pub mod stats;

pub use compactor::{
    CompactorConfig, DEFAULT_SUMMARY_PROMPT, LlmSummarizer, LlmSummarizerConfig, SUMMARY_PREFIX,
    SharedSummarizer, SummaryCompactor, SummaryTurn, Summarizer, clean_summary,
    smart_fallback_summary,
};
pub use error::{MemoryError, Result};
pub use format::{HISTORY_HEADER, SEMANTIC_HEADER};
pub use memory::{
    ConversationMemory, ConversationMemoryBuilder, MemorySettings, SESSION_HISTORY_LIMIT,
};
pub use stats::{MemoryStats, SessionInfo};

pub use colloq_types::{Message, Metadata, Role, SemanticMatch, SessionId, StorageKind};
