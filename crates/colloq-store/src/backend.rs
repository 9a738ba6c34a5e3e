//! Durable key-value backends.
//!
//! [`DurableBackend`] is the narrow contract the stores need from a shared,
//! TTL-capable key-value service. [`RedisBackend`] is the production
//! implementation; [`MockDurableBackend`] is an in-process fake with the
//! same expiry semantics and injectable failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::ttl::TtlTracker;

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Abstract key-value operations required from the durable tier.
#[async_trait]
pub trait DurableBackend: Send + Sync {
    /// Fetch a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete a key, returning the number of keys removed.
    async fn del(&self, key: &str) -> Result<usize>;

    /// Push a key's expiry out to `ttl` from now. Missing keys are ignored.
    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<()>;

    /// All keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Liveness check.
    async fn ping(&self) -> Result<()>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// A backend that can be shared across tasks.
pub type SharedDurableBackend = Arc<dyn DurableBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Redis
// ─────────────────────────────────────────────────────────────────────────────

/// Redis-backed durable storage over a reconnecting [`ConnectionManager`].
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    /// Connect to Redis.
    ///
    /// `timeout` bounds both connection establishment and every response.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(Some(timeout))
            .set_response_timeout(Some(timeout))
            .set_number_of_retries(1);
        let manager = ConnectionManager::new_with_config(client, config).await?;
        debug!(backend = "redis", "Connected to durable backend");
        Ok(Self { manager })
    }
}

#[async_trait]
impl DurableBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        let removed: usize = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async::<bool>(&mut conn)
            .await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MockState {
    values: HashMap<String, String>,
    ttl: TtlTracker,
}

impl MockState {
    /// Lazily drop a key whose deadline passed.
    fn purge(&mut self, key: &str) {
        if self.ttl.is_expired(key) {
            self.values.remove(key);
            self.ttl.remove(key);
        }
    }

    fn purge_all(&mut self) {
        for key in self.ttl.drain_expired() {
            self.values.remove(&key);
        }
    }
}

/// In-process stand-in for Redis.
///
/// Honours TTLs lazily on access. Failures can be injected either
/// permanently ([`set_unreachable`](Self::set_unreachable)) or for the next
/// N calls ([`fail_next`](Self::fail_next)).
#[derive(Debug, Default)]
pub struct MockDurableBackend {
    state: Mutex<MockState>,
    unreachable: AtomicBool,
    pending_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl MockDurableBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that fails every call, including the liveness probe.
    pub fn unreachable() -> Self {
        let backend = Self::default();
        backend.set_unreachable(true);
        backend
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Fail the next `n` calls, then recover.
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Total calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Raw stored value, bypassing failure injection.
    pub fn raw(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        state.purge(key);
        state.values.get(key).cloned()
    }

    /// Store a raw value without expiry, bypassing failure injection.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.state
            .lock()
            .values
            .insert(key.to_string(), value.to_string());
    }

    /// Remaining TTL of a key, if it has one.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        self.state.lock().ttl.remaining(key)
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        let consumed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableBackend for MockDurableBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let mut state = self.state.lock();
        state.purge(key);
        Ok(state.values.get(key).cloned())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        state.values.insert(key.to_string(), value.to_string());
        state.ttl.touch(key, ttl);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<usize> {
        self.check()?;
        let mut state = self.state.lock();
        state.purge(key);
        state.ttl.remove(key);
        Ok(usize::from(state.values.remove(key).is_some()))
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        state.purge(key);
        if state.values.contains_key(key) {
            state.ttl.touch(key, ttl);
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.check()?;
        let mut state = self.state.lock();
        state.purge_all();
        let mut keys: Vec<String> = state
            .values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
