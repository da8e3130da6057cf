// ABOUTME: Per-direction counters exposed for callers to log or export
// ABOUTME: Arc-shared so a handle can be cloned into a task while the original stays with its owner

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared, cheaply cloneable counters for one pump instance.
#[derive(Debug, Default, Clone)]
pub struct PumpStats(Arc<Counters>);

#[derive(Debug, Default)]
struct Counters {
    tap_to_sock_frames: AtomicU64,
    tap_to_sock_bytes: AtomicU64,
    sock_to_tap_frames: AtomicU64,
    sock_to_tap_bytes: AtomicU64,
    dropped_invalid: AtomicU64,
}

/// A consistent point-in-time read of [`PumpStats`]'s counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PumpStatsSnapshot {
    pub tap_to_sock_frames: u64,
    pub tap_to_sock_bytes: u64,
    pub sock_to_tap_frames: u64,
    pub sock_to_tap_bytes: u64,
    pub dropped_invalid: u64,
}

impl PumpStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_tap_to_sock(&self, bytes: u64) {
        self.0.tap_to_sock_frames.fetch_add(1, Ordering::Relaxed);
        self.0.tap_to_sock_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_sock_to_tap(&self, bytes: u64) {
        self.0.sock_to_tap_frames.fetch_add(1, Ordering::Relaxed);
        self.0.sock_to_tap_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_invalid(&self) {
        self.0.dropped_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PumpStatsSnapshot {
        PumpStatsSnapshot {
            tap_to_sock_frames: self.0.tap_to_sock_frames.load(Ordering::Relaxed),
            tap_to_sock_bytes: self.0.tap_to_sock_bytes.load(Ordering::Relaxed),
            sock_to_tap_frames: self.0.sock_to_tap_frames.load(Ordering::Relaxed),
            sock_to_tap_bytes: self.0.sock_to_tap_bytes.load(Ordering::Relaxed),
            dropped_invalid: self.0.dropped_invalid.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = PumpStats::new();
        assert_eq!(stats.snapshot(), PumpStatsSnapshot::default());
    }

    #[test]
    fn recording_accumulates_across_clones() {
        let stats = PumpStats::new();
        let clone = stats.clone();

        stats.record_tap_to_sock(10);
        clone.record_tap_to_sock(5);
        clone.record_sock_to_tap(3);
        stats.record_dropped_invalid();

        let snap = stats.snapshot();
        assert_eq!(snap.tap_to_sock_frames, 2);
        assert_eq!(snap.tap_to_sock_bytes, 15);
        assert_eq!(snap.sock_to_tap_frames, 1);
        assert_eq!(snap.sock_to_tap_bytes, 3);
        assert_eq!(snap.dropped_invalid, 1);
    }
}
