//! Shared types for the Colloq conversation memory service.
//!
//! Everything that crosses a crate boundary lives here: the [`Message`]
//! record persisted per session, the cached [`SummaryRecord`], semantic
//! search hits, and the [`StorageKind`] reported by status queries.

pub mod clock;
pub mod message;
pub mod summary;

pub use clock::monotonic_timestamp;
pub use message::{Message, Metadata, Role, SemanticMatch, SessionId, StorageKind};
pub use summary::SummaryRecord;

/// Generate a fresh opaque session identifier (UUID v4).
pub fn new_session_id() -> SessionId {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique_uuids() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }
}
