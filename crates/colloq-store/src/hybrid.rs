//! Durable storage with an in-process fallback.
//!
//! The tier is chosen once, at construction, by probing the durable backend.
//! If the probe fails the store runs volatile-only for the rest of the
//! process. If it succeeds, each operation still falls back to the volatile
//! tier when its durable call fails. Data written during such a fallback is
//! visible only to this process and is never copied back.

use std::sync::Arc;

use async_trait::async_trait;
use colloq_types::{Message, StorageKind, SummaryRecord};
use tracing::{info, warn};

use crate::backend::{RedisBackend, SharedDurableBackend};
use crate::config::StoreConfig;
use crate::durable::DurableStore;
use crate::error::{Result, StoreError};
use crate::keyed::{KeyedStore, SummaryStore};
use crate::volatile::VolatileStore;

/// [`KeyedStore`] that selects durable or volatile storage once and falls
/// back per call.
pub struct HybridStore {
    durable: Option<DurableStore>,
    volatile: VolatileStore,
    config: StoreConfig,
}

impl HybridStore {
    /// A store that never touches a durable backend.
    pub fn volatile_only(config: StoreConfig) -> Self {
        Self {
            durable: None,
            volatile: VolatileStore::new(&config),
            config,
        }
    }

    /// Probe `backend` once and select the tier for the process lifetime.
    pub async fn with_backend(config: StoreConfig, backend: SharedDurableBackend) -> Self {
        let probe = tokio::time::timeout(config.probe_timeout, backend.ping()).await;
        match probe {
            Ok(Ok(())) => {
                info!(backend = backend.name(), "Durable backend reachable, using durable storage");
                Self {
                    durable: Some(DurableStore::new(backend, config.clone())),
                    volatile: VolatileStore::new(&config),
                    config,
                }
            }
            Ok(Err(e)) => {
                warn!(backend = backend.name(), error = %e, "Durable backend unreachable at startup, using volatile storage");
                Self::volatile_only(config)
            }
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    timeout_ms = config.probe_timeout.as_millis() as u64,
                    "Durable backend probe timed out, using volatile storage"
                );
                Self::volatile_only(config)
            }
        }
    }

    /// Connect to Redis at `url` (if any) and select the tier.
    pub async fn connect(config: StoreConfig, url: Option<&str>) -> Self {
        let Some(url) = url else {
            info!("No durable backend configured, using volatile storage");
            return Self::volatile_only(config);
        };

        let connect = RedisBackend::connect(url, config.operation_timeout);
        match tokio::time::timeout(config.probe_timeout, connect).await {
            Ok(Ok(backend)) => Self::with_backend(config, Arc::new(backend)).await,
            Ok(Err(e)) => {
                warn!(backend = "redis", error = %e, "Durable backend unreachable at startup, using volatile storage");
                Self::volatile_only(config)
            }
            Err(_) => {
                warn!(
                    backend = "redis",
                    timeout_ms = config.probe_timeout.as_millis() as u64,
                    "Durable backend connection timed out, using volatile storage"
                );
                Self::volatile_only(config)
            }
        }
    }

    /// The tier selected at construction.
    pub fn storage_kind(&self) -> StorageKind {
        if self.durable.is_some() {
            StorageKind::Durable
        } else {
            StorageKind::Volatile
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn volatile(&self) -> &VolatileStore {
        &self.volatile
    }

    pub fn durable(&self) -> Option<&DurableStore> {
        self.durable.as_ref()
    }

    /// Live ping of the durable backend. False when running volatile-only.
    pub async fn durable_reachable(&self) -> bool {
        let Some(durable) = &self.durable else {
            return false;
        };
        matches!(
            tokio::time::timeout(self.config.probe_timeout, durable.backend().ping()).await,
            Ok(Ok(()))
        )
    }

    /// Number of sessions in the durable tier, if one is selected and answers.
    pub async fn durable_session_count(&self) -> Option<usize> {
        let durable = self.durable.as_ref()?;
        match durable.count_keys_by_prefix("").await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Failed to count durable sessions");
                None
            }
        }
    }

    fn log_fallback(op: &'static str, session_id: &str, error: &StoreError) {
        warn!(
            op,
            session_id,
            error = %error,
            "Durable operation failed, falling back to volatile storage"
        );
    }
}

#[async_trait]
impl KeyedStore for HybridStore {
    async fn append(&self, session_id: &str, message: Message) -> Result<()> {
        if let Some(durable) = &self.durable {
            match durable.append(session_id, message.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => Self::log_fallback("append", session_id, &e),
            }
        }
        self.volatile.append(session_id, message).await
    }

    async fn read(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        if let Some(durable) = &self.durable {
            match durable.read(session_id, limit).await {
                Ok(messages) => return Ok(messages),
                Err(e) => Self::log_fallback("read", session_id, &e),
            }
        }
        self.volatile.read(session_id, limit).await
    }

    /// Removes the session from every tier that holds it.
    async fn remove(&self, session_id: &str) -> Result<bool> {
        let mut removed = false;
        if let Some(durable) = &self.durable {
            match durable.remove(session_id).await {
                Ok(r) => removed |= r,
                Err(e) => Self::log_fallback("remove", session_id, &e),
            }
        }
        removed |= self.volatile.remove(session_id).await?;
        Ok(removed)
    }

    async fn exists_and_count(&self, session_id: &str) -> Result<(bool, usize)> {
        if let Some(durable) = &self.durable {
            match durable.exists_and_count(session_id).await {
                Ok(found) => return Ok(found),
                Err(e) => Self::log_fallback("exists_and_count", session_id, &e),
            }
        }
        self.volatile.exists_and_count(session_id).await
    }

    async fn count_keys_by_prefix(&self, prefix: &str) -> Result<usize> {
        if let Some(durable) = &self.durable {
            match durable.count_keys_by_prefix(prefix).await {
                Ok(count) => return Ok(count),
                Err(e) => Self::log_fallback("count_keys_by_prefix", prefix, &e),
            }
        }
        self.volatile.count_keys_by_prefix(prefix).await
    }

    /// Clears both tiers and returns the combined count.
    async fn clear_all(&self) -> Result<usize> {
        let mut cleared = 0;
        if let Some(durable) = &self.durable {
            match durable.clear_all().await {
                Ok(count) => cleared += count,
                Err(e) => Self::log_fallback("clear_all", "*", &e),
            }
        }
        cleared += self.volatile.clear_all().await?;
        Ok(cleared)
    }

    fn kind(&self) -> StorageKind {
        self.storage_kind()
    }
}

#[async_trait]
impl SummaryStore for HybridStore {
    async fn get_summary(&self, session_id: &str) -> Result<Option<SummaryRecord>> {
        if let Some(durable) = &self.durable {
            match durable.get_summary(session_id).await {
                Ok(record) => return Ok(record),
                Err(e) => Self::log_fallback("get_summary", session_id, &e),
            }
        }
        self.volatile.get_summary(session_id).await
    }

    async fn put_summary(&self, record: &SummaryRecord) -> Result<()> {
        if let Some(durable) = &self.durable {
            match durable.put_summary(record).await {
                Ok(()) => return Ok(()),
                Err(e) => Self::log_fallback("put_summary", &record.session_id, &e),
            }
        }
        self.volatile.put_summary(record).await
    }

    async fn invalidate_summary(&self, session_id: &str) -> Result<bool> {
        let mut removed = false;
        if let Some(durable) = &self.durable {
            match durable.invalidate_summary(session_id).await {
                Ok(r) => removed |= r,
                Err(e) => Self::log_fallback("invalidate_summary", session_id, &e),
            }
        }
        removed |= self.volatile.invalidate_summary(session_id).await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockDurableBackend;
    use std::time::Duration;

    async fn durable_store() -> (HybridStore, Arc<MockDurableBackend>) {
        let backend = Arc::new(MockDurableBackend::new());
        let store = HybridStore::with_backend(StoreConfig::new(), backend.clone()).await;
        (store, backend)
    }

    #[tokio::test]
    async fn test_reachable_backend_selects_durable() {
        let (store, backend) = durable_store().await;
        assert_eq!(store.storage_kind(), StorageKind::Durable);

        store.append("s1", Message::user("hi")).await.unwrap();
        assert!(backend.raw("conv:s1").is_some());
        assert_eq!(store.volatile().session_count(), 0);
        assert!(store.durable_reachable().await);
        assert_eq!(store.durable_session_count().await, Some(1));
    }

    #[tokio::test]
    async fn test_unreachable_backend_selects_volatile_permanently() {
        let backend = Arc::new(MockDurableBackend::unreachable());
        let store = HybridStore::with_backend(StoreConfig::new(), backend.clone()).await;
        assert_eq!(store.storage_kind(), StorageKind::Volatile);

        // Recovery later does not re-enable the durable tier.
        backend.set_unreachable(false);
        store.append("s1", Message::user("hi")).await.unwrap();
        assert!(backend.raw("conv:s1").is_none());
        assert_eq!(store.read("s1", 10).await.unwrap().len(), 1);
        assert!(!store.durable_reachable().await);
        assert_eq!(store.durable_session_count().await, None);
    }

    #[tokio::test]
    async fn test_no_url_is_volatile() {
        let store = HybridStore::connect(StoreConfig::new(), None).await;
        assert_eq!(store.storage_kind(), StorageKind::Volatile);
    }

    #[tokio::test]
    async fn test_unroutable_redis_url_is_volatile() {
        let config = StoreConfig::new()
            .with_probe_timeout(Duration::from_millis(500))
            .with_operation_timeout(Duration::from_millis(200));
        let store = HybridStore::connect(config, Some("redis://127.0.0.1:1/")).await;
        assert_eq!(store.storage_kind(), StorageKind::Volatile);
    }

    #[tokio::test]
    async fn test_transient_append_failure_falls_back() {
        let (store, backend) = durable_store().await;
        backend.fail_next(1);

        store.append("s1", Message::user("during outage")).await.unwrap();
        assert!(backend.raw("conv:s1").is_none());
        assert_eq!(store.volatile().message_count(), 1);
        assert_eq!(store.storage_kind(), StorageKind::Durable);
    }

    #[tokio::test]
    async fn test_transient_read_failure_reads_volatile() {
        let (store, backend) = durable_store().await;
        backend.fail_next(1);
        store.append("s1", Message::user("fallback copy")).await.unwrap();

        backend.fail_next(1);
        let messages = store.read("s1", 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "fallback copy");
    }

    #[tokio::test]
    async fn test_remove_covers_both_tiers() {
        let (store, backend) = durable_store().await;
        store.append("s1", Message::user("durable")).await.unwrap();
        backend.fail_next(1);
        store.append("s1", Message::user("volatile")).await.unwrap();

        assert!(store.remove("s1").await.unwrap());
        assert!(backend.raw("conv:s1").is_none());
        assert_eq!(store.volatile().session_count(), 0);
        assert!(!store.remove("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_all_sums_tiers() {
        let (store, backend) = durable_store().await;
        store.append("a", Message::user("1")).await.unwrap();
        store.append("b", Message::user("2")).await.unwrap();
        backend.fail_next(1);
        store.append("c", Message::user("3")).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 3);
        assert_eq!(store.count_keys_by_prefix("").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_summary_falls_back_when_durable_fails() {
        let (store, backend) = durable_store().await;
        backend.fail_next(1);
        store
            .put_summary(&SummaryRecord::new("s1", "cached locally", 5))
            .await
            .unwrap();
        assert!(backend.raw("summary:s1").is_none());
        assert_eq!(store.volatile().summary_count(), 1);
    }
}
