//! Session storage on a shared durable backend.
//!
//! Each session is one key holding a JSON array of messages. Appends are a
//! read-modify-write of that array: two workers appending to the same
//! session at the same moment can overwrite each other, and the last write
//! wins.

use async_trait::async_trait;
use colloq_types::{Message, StorageKind, SummaryRecord};
use tracing::{debug, trace};

use crate::backend::SharedDurableBackend;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::keyed::{KeyedStore, SummaryStore};

/// [`KeyedStore`] over a [`DurableBackend`](crate::DurableBackend).
#[derive(Clone)]
pub struct DurableStore {
    backend: SharedDurableBackend,
    config: StoreConfig,
}

impl DurableStore {
    pub fn new(backend: SharedDurableBackend, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &SharedDurableBackend {
        &self.backend
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}{}", self.config.session_prefix, session_id)
    }

    fn summary_key(&self, session_id: &str) -> String {
        format!("{}{}", self.config.summary_prefix, session_id)
    }

    /// Load and decode a session's full message list.
    async fn load(&self, key: &str) -> Result<Option<Vec<Message>>> {
        match self.backend.get(key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
        }
    }
}

#[async_trait]
impl KeyedStore for DurableStore {
    async fn append(&self, session_id: &str, message: Message) -> Result<()> {
        let key = self.session_key(session_id);
        let mut messages = self.load(&key).await?.unwrap_or_default();
        messages.push(message);

        let max = self.config.max_messages_per_session;
        if messages.len() > max {
            let excess = messages.len() - max;
            messages.drain(..excess);
            trace!(session_id, dropped = excess, "Trimmed durable session");
        }

        let payload = serde_json::to_string(&messages)?;
        self.backend
            .set_with_ttl(&key, &payload, self.config.session_ttl)
            .await?;
        debug!(session_id, count = messages.len(), "Stored message in durable backend");
        Ok(())
    }

    async fn read(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let key = self.session_key(session_id);
        let Some(messages) = self.load(&key).await? else {
            return Ok(Vec::new());
        };
        self.backend
            .refresh_ttl(&key, self.config.session_ttl)
            .await?;

        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        let removed = self.backend.del(&self.session_key(session_id)).await?;
        Ok(removed > 0)
    }

    async fn exists_and_count(&self, session_id: &str) -> Result<(bool, usize)> {
        let messages = self.load(&self.session_key(session_id)).await?;
        Ok(match messages {
            Some(messages) => (true, messages.len()),
            None => (false, 0),
        })
    }

    async fn count_keys_by_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self
            .backend
            .scan_prefix(&self.session_key(prefix))
            .await?;
        Ok(keys.len())
    }

    async fn clear_all(&self) -> Result<usize> {
        let keys = self
            .backend
            .scan_prefix(&self.config.session_prefix)
            .await?;
        let mut removed = 0;
        for key in &keys {
            removed += self.backend.del(key).await?;
        }

        // Summaries go too, but only sessions are counted.
        for key in self.backend.scan_prefix(&self.config.summary_prefix).await? {
            self.backend.del(&key).await?;
        }
        Ok(removed)
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Durable
    }
}

#[async_trait]
impl SummaryStore for DurableStore {
    async fn get_summary(&self, session_id: &str) -> Result<Option<SummaryRecord>> {
        let key = self.summary_key(session_id);
        match self.backend.get(&key).await? {
            None => Ok(None),
            Some(raw) => {
                let mut record: SummaryRecord =
                    serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                        key: key.clone(),
                        source,
                    })?;
                if record.session_id.is_empty() {
                    record.session_id = session_id.to_string();
                }
                Ok(Some(record))
            }
        }
    }

    async fn put_summary(&self, record: &SummaryRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.backend
            .set_with_ttl(
                &self.summary_key(&record.session_id),
                &payload,
                self.config.session_ttl,
            )
            .await
    }

    async fn invalidate_summary(&self, session_id: &str) -> Result<bool> {
        let removed = self.backend.del(&self.summary_key(session_id)).await?;
        Ok(removed > 0)
    }
}
