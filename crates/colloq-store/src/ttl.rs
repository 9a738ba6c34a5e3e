//! Deadline tracking for keys with a time-to-live.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks per-key expiry deadlines the way a TTL-capable key-value store does.
///
/// Keys without a deadline never expire.
#[derive(Debug, Default)]
pub struct TtlTracker {
    deadlines: HashMap<String, Instant>,
}

impl TtlTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or reset) the deadline for a key to `ttl` from now.
    pub fn touch(&mut self, key: &str, ttl: Duration) {
        self.deadlines.insert(key.to_string(), Instant::now() + ttl);
    }

    /// Check if a key's deadline has passed.
    pub fn is_expired(&self, key: &str) -> bool {
        self.deadlines
            .get(key)
            .is_some_and(|deadline| Instant::now() >= *deadline)
    }

    /// Time left before the key expires, if it has a deadline.
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        self.deadlines
            .get(key)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Forget a key's deadline.
    pub fn remove(&mut self, key: &str) {
        self.deadlines.remove(key);
    }

    /// Remove all expired deadlines and return their keys.
    pub fn drain_expired(&mut self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.deadlines.remove(key);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_untracked_key_never_expires() {
        let tracker = TtlTracker::new();
        assert!(!tracker.is_expired("conv:a"));
        assert!(tracker.remaining("conv:a").is_none());
    }

    #[test]
    fn test_expires_after_ttl() {
        let mut tracker = TtlTracker::new();
        tracker.touch("conv:a", Duration::from_millis(20));
        assert!(!tracker.is_expired("conv:a"));

        thread::sleep(Duration::from_millis(40));
        assert!(tracker.is_expired("conv:a"));
    }

    #[test]
    fn test_touch_resets_deadline() {
        let mut tracker = TtlTracker::new();
        tracker.touch("conv:a", Duration::from_millis(50));

        thread::sleep(Duration::from_millis(30));
        tracker.touch("conv:a", Duration::from_millis(50));

        thread::sleep(Duration::from_millis(30));
        assert!(!tracker.is_expired("conv:a"));
    }

    #[test]
    fn test_drain_expired() {
        let mut tracker = TtlTracker::new();
        tracker.touch("conv:short", Duration::from_millis(10));
        tracker.touch("conv:long", Duration::from_secs(60));

        thread::sleep(Duration::from_millis(30));
        let expired = tracker.drain_expired();
        assert_eq!(expired, vec!["conv:short".to_string()]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut tracker = TtlTracker::new();
        tracker.touch("conv:a", Duration::from_millis(1));
        tracker.remove("conv:a");
        assert!(tracker.is_empty());
        thread::sleep(Duration::from_millis(5));
        assert!(!tracker.is_expired("conv:a"));
    }
}
