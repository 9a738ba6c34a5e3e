//! Configuration for session storage.

use std::time::Duration;

/// Default FIFO bound on messages kept per session.
pub const DEFAULT_MAX_MESSAGES: usize = 20;

/// Default sliding TTL for durable sessions and their summaries.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Default key namespace for session payloads.
pub const DEFAULT_SESSION_PREFIX: &str = "conv:";

/// Default key namespace for cached summaries.
pub const DEFAULT_SUMMARY_PREFIX: &str = "summary:";

/// Default bound on the one-time liveness probe and on each durable call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of summaries held by the volatile tier.
pub const DEFAULT_SUMMARY_CACHE_CAPACITY: usize = 1024;

/// Configuration shared by the durable, volatile and hybrid stores.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Messages kept per session; older ones are dropped first.
    pub max_messages_per_session: usize,

    /// Sliding expiry for durable keys, refreshed on read and write.
    pub session_ttl: Duration,

    /// Prefix for session payload keys.
    pub session_prefix: String,

    /// Prefix for summary keys.
    pub summary_prefix: String,

    /// Timeout for the construction-time liveness probe.
    pub probe_timeout: Duration,

    /// Connect and response timeout for durable operations.
    pub operation_timeout: Duration,

    /// LRU capacity of the volatile summary cache.
    pub summary_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_messages_per_session: DEFAULT_MAX_MESSAGES,
            session_ttl: DEFAULT_SESSION_TTL,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            summary_prefix: DEFAULT_SUMMARY_PREFIX.to_string(),
            probe_timeout: DEFAULT_BACKEND_TIMEOUT,
            operation_timeout: DEFAULT_BACKEND_TIMEOUT,
            summary_cache_capacity: DEFAULT_SUMMARY_CACHE_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-session message bound (minimum 1).
    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages_per_session = max.max(1);
        self
    }

    /// Set the sliding TTL for durable sessions.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set both key prefixes.
    pub fn with_prefixes(
        mut self,
        session_prefix: impl Into<String>,
        summary_prefix: impl Into<String>,
    ) -> Self {
        self.session_prefix = session_prefix.into();
        self.summary_prefix = summary_prefix.into();
        self
    }

    /// Set the liveness probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the volatile summary cache capacity.
    pub fn with_summary_cache_capacity(mut self, capacity: usize) -> Self {
        self.summary_cache_capacity = capacity;
        self
    }

    /// TTL in whole seconds, never zero.
    pub fn ttl_secs(&self) -> u64 {
        self.session_ttl.as_secs().max(1)
    }
}
