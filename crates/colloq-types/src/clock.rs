//! Process-wide timestamp source.
//!
//! Message timestamps double as part of the semantic document id, so two
//! messages created in the same microsecond must still get distinct values.

use std::sync::atomic::{AtomicI64, Ordering};

static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

/// Seconds since the Unix epoch, strictly increasing within this process.
///
/// Wall-clock readings that do not advance past the previous value are
/// bumped by one microsecond.
pub fn monotonic_timestamp() -> f64 {
    let now = chrono::Utc::now().timestamp_micros();
    let mut last = LAST_MICROS.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_MICROS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next as f64 / 1_000_000.0,
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut prev = monotonic_timestamp();
        for _ in 0..1000 {
            let next = monotonic_timestamp();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_timestamps_strictly_increase_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| monotonic_timestamp()).collect::<Vec<_>>()))
            .collect();

        let mut all: Vec<f64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_timestamp_is_epoch_seconds() {
        let ts = monotonic_timestamp();
        // Well after 2020-01-01.
        assert!(ts > 1_577_836_800.0);
    }
}
