use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic timestamp of the last parsed frame header.
///
/// Written by the reader, read by any thread that watches for a stalled
/// connection. Stored as nanoseconds since creation so it fits in an atomic.
#[derive(Debug)]
pub struct ActivityClock {
    origin: Instant,
    offset_ns: AtomicU64,
}

impl ActivityClock {
    /// A clock whose last activity is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ns: AtomicU64::new(0),
        }
    }

    /// Record activity at the current instant.
    pub fn touch(&self) {
        let elapsed = self.origin.elapsed().as_nanos();
        self.offset_ns
            .store(elapsed.min(u64::MAX as u128) as u64, Ordering::Relaxed);
    }

    /// When activity was last recorded.
    pub fn last(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_ns.load(Ordering::Relaxed))
    }

    /// Time since activity was last recorded.
    pub fn idle(&self) -> Duration {
        self.last().elapsed()
    }

    /// Whether no activity has been recorded for at least `threshold`.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.idle() >= threshold
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}
