//! Time sources.
//!
//! The throttle measures refill on a monotonic clock; token validity is
//! measured in UTC unix seconds. Both come from one injectable [`Clock`] so
//! tests can drive time deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync + 'static {
    /// Monotonic now.
    fn now(&self) -> Instant;

    /// Current UTC time as seconds since the unix epoch.
    fn unix_now(&self) -> i64;
}

/// Wall clock of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same offset, so a test can keep one handle and give
/// another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    base_unix: i64,
    offset_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start at the host's current time.
    pub fn new() -> Self {
        Self::starting_at(SystemClock.unix_now())
    }

    /// Start at a fixed unix timestamp.
    pub fn starting_at(unix_secs: i64) -> Self {
        Self {
            base: Instant::now(),
            base_unix: unix_secs,
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }

    fn unix_now(&self) -> i64 {
        self.base_unix + self.offset().as_secs() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_advance() {
        let clock = ManualClock::starting_at(1_000);
        let start = clock.now();
        assert_eq!(clock.now(), start);
        assert_eq!(clock.unix_now(), 1_000);

        let shared = clock.clone();
        shared.advance(Duration::from_millis(2_500));

        assert_eq!(clock.now() - start, Duration::from_millis(2_500));
        assert_eq!(clock.unix_now(), 1_002);
    }
}
