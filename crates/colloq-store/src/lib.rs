//! Session storage for the Colloq conversation memory service.
//!
//! This crate provides per-session message storage with:
//! - A durable tier over Redis with a sliding TTL
//! - A volatile in-process tier with fixed-capacity FIFO histories
//! - A hybrid store that picks a tier once and falls back per call
//! - A summary cache stored alongside the sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use colloq_store::{HybridStore, KeyedStore, StoreConfig};
//!
//! let config = StoreConfig::default().with_max_messages(20);
//! let store = HybridStore::connect(config, Some("redis://127.0.0.1:6379")).await;
//! store.append("session-1", Message::user("hello")).await?;
//! ```

mod backend;
mod config;
mod durable;
mod error;
mod hybrid;
mod keyed;
mod ttl;
mod volatile;

pub use backend::{DurableBackend, MockDurableBackend, RedisBackend, SharedDurableBackend};
pub use config::{
    DEFAULT_BACKEND_TIMEOUT, DEFAULT_MAX_MESSAGES, DEFAULT_SESSION_PREFIX, DEFAULT_SESSION_TTL,
    DEFAULT_SUMMARY_CACHE_CAPACITY, DEFAULT_SUMMARY_PREFIX, StoreConfig,
};
pub use durable::DurableStore;
pub use error::{Result, StoreError};
pub use hybrid::HybridStore;
pub use keyed::{KeyedStore, SummaryStore};
pub use ttl::TtlTracker;
pub use volatile::{BoundedHistory, VolatileStore};
