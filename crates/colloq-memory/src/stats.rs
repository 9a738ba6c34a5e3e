//! Status reports returned by the memory service.

use colloq_types::StorageKind;
use serde::{Deserialize, Serialize};

/// What is known about one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub exists: bool,
    pub message_count: usize,
    pub first_message_time: Option<f64>,
    pub last_message_time: Option<f64>,
    pub user_message_count: usize,
    pub assistant_message_count: usize,
    pub storage_kind: StorageKind,
}

/// Service-wide counters and settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub storage_kind: StorageKind,
    /// Live answer to a ping, not the construction-time choice.
    pub durable_reachable: bool,
    /// `None` when no durable tier is selected or it did not answer.
    pub durable_session_count: Option<usize>,
    pub volatile_session_count: usize,
    pub volatile_message_count: usize,
    pub semantic_enabled: bool,
    pub semantic_entry_count: usize,
    pub summarizer: Option<String>,
    pub max_messages_per_session: usize,
    pub session_ttl_secs: u64,
    pub default_history_limit: usize,
    pub summarize_threshold: usize,
}
