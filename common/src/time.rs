//! Time utilities and constants for Bazaar pricing.

use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Pricing timing constants.
pub mod constants {
    use super::Duration;

    /// How long fetched rates count as fresh (1 hour).
    pub fn rate_cache_max_age() -> Duration {
        Duration::hours(1)
    }

    /// Timeout for one rates request (8 seconds).
    pub fn rates_request_timeout() -> Duration {
        Duration::seconds(8)
    }

    /// Longest request timeout configuration will accept (60 seconds).
    pub fn max_rates_request_timeout() -> Duration {
        Duration::seconds(60)
    }
}

/// Get the current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    Utc::now().timestamp_millis()
}

/// Check if something fetched at `fetched_at` is younger than `max_age` at `now`.
///
/// The comparison is strict: an age of exactly `max_age` is stale. A
/// `fetched_at` later than `now` is never fresh.
pub fn is_fresh(fetched_at: EpochMillis, now: EpochMillis, max_age: Duration) -> bool {
    let age = now.saturating_sub(fetched_at);
    (0..max_age.num_milliseconds()).contains(&age)
}

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> EpochMillis;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> EpochMillis {
        now_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: EpochMillis) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: EpochMillis) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> EpochMillis {
        self.now.load(Ordering::SeqCst)
    }
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
