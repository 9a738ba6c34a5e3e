//! Process-local session storage.
//!
//! Sessions live for the lifetime of the process unless explicitly removed.
//! Nothing here is shared with other workers.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;

use async_trait::async_trait;
use colloq_types::{Message, SessionId, StorageKind, SummaryRecord};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::keyed::{KeyedStore, SummaryStore};

/// Fixed-capacity message history with FIFO eviction.
#[derive(Debug, Clone)]
pub struct BoundedHistory {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl BoundedHistory {
    /// Create an empty history holding at most `capacity` messages (min 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a message, returning the evicted oldest one if the bound was hit.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.messages.len() == self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// The most recent `limit` messages, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// [`KeyedStore`] held entirely in process memory.
pub struct VolatileStore {
    sessions: RwLock<HashMap<SessionId, BoundedHistory>>,
    summaries: Mutex<LruCache<SessionId, SummaryRecord>>,
    max_messages: usize,
}

impl VolatileStore {
    pub fn new(config: &StoreConfig) -> Self {
        let cap = NonZeroUsize::new(config.summary_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: RwLock::new(HashMap::new()),
            summaries: Mutex::new(LruCache::new(cap)),
            max_messages: config.max_messages_per_session,
        }
    }

    /// Number of sessions currently held.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Total messages across all sessions.
    pub fn message_count(&self) -> usize {
        self.sessions.read().values().map(BoundedHistory::len).sum()
    }

    /// Number of cached summaries.
    pub fn summary_count(&self) -> usize {
        self.summaries.lock().len()
    }
}

#[async_trait]
impl KeyedStore for VolatileStore {
    async fn append(&self, session_id: &str, message: Message) -> Result<()> {
        let mut sessions = self.sessions.write();
        let history = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| BoundedHistory::with_capacity(self.max_messages));
        if history.push(message).is_some() {
            trace!(session_id, "Evicted oldest volatile message");
        }
        Ok(())
    }

    async fn read(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        Ok(self
            .sessions
            .read()
            .get(session_id)
            .map(|h| h.recent(limit))
            .unwrap_or_default())
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        let removed = self.sessions.write().remove(session_id).is_some();
        self.summaries.lock().pop(session_id);
        Ok(removed)
    }

    async fn exists_and_count(&self, session_id: &str) -> Result<(bool, usize)> {
        Ok(match self.sessions.read().get(session_id) {
            Some(history) => (true, history.len()),
            None => (false, 0),
        })
    }

    async fn count_keys_by_prefix(&self, prefix: &str) -> Result<usize> {
        Ok(self
            .sessions
            .read()
            .keys()
            .filter(|id| id.starts_with(prefix))
            .count())
    }

    async fn clear_all(&self) -> Result<usize> {
        let mut sessions = self.sessions.write();
        let count = sessions.len();
        sessions.clear();
        self.summaries.lock().clear();
        Ok(count)
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Volatile
    }
}

#[async_trait]
impl SummaryStore for VolatileStore {
    async fn get_summary(&self, session_id: &str) -> Result<Option<SummaryRecord>> {
        Ok(self.summaries.lock().get(session_id).cloned())
    }

    async fn put_summary(&self, record: &SummaryRecord) -> Result<()> {
        self.summaries
            .lock()
            .put(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn invalidate_summary(&self, session_id: &str) -> Result<bool> {
        Ok(self.summaries.lock().pop(session_id).is_some())
    }
}
