//! Storage contracts shared by the durable, volatile and hybrid stores.

use async_trait::async_trait;
use colloq_types::{Message, StorageKind, SummaryRecord};

use crate::error::Result;

/// Per-session message storage with FIFO trimming.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Append a message, dropping the oldest ones beyond the configured bound.
    async fn append(&self, session_id: &str, message: Message) -> Result<()>;

    /// The most recent `limit` messages, oldest first.
    async fn read(&self, session_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// Delete a session. Returns whether anything was removed.
    async fn remove(&self, session_id: &str) -> Result<bool>;

    /// Whether the session exists, and how many messages it holds.
    async fn exists_and_count(&self, session_id: &str) -> Result<(bool, usize)>;

    /// Number of stored sessions whose id starts with `prefix`.
    async fn count_keys_by_prefix(&self, prefix: &str) -> Result<usize>;

    /// Delete every session. Returns the number removed.
    async fn clear_all(&self) -> Result<usize>;

    /// Which tier this store represents.
    fn kind(&self) -> StorageKind;
}

/// Cache of generated session summaries.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Cached summary for a session, whatever message count it was built at.
    async fn get_summary(&self, session_id: &str) -> Result<Option<SummaryRecord>>;

    /// Cache a summary under `record.session_id`.
    async fn put_summary(&self, record: &SummaryRecord) -> Result<()>;

    /// Drop a cached summary. Returns whether one existed.
    async fn invalidate_summary(&self, session_id: &str) -> Result<bool>;
}
