//! Durable exchange-rate cache with a freshness window.

use bazaar_common::{constants, is_fresh, Clock, EpochMillis, RateTable, SystemClock};
use chrono::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};
use crate::store::{keys, SharedStore};

/// A rate table together with the time it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRateSnapshot {
    pub table: RateTable,
    pub fetched_at_ms: EpochMillis,
}

impl CachedRateSnapshot {
    pub fn new(table: RateTable, fetched_at_ms: EpochMillis) -> Self {
        Self {
            table,
            fetched_at_ms,
        }
    }

    /// Age of the snapshot at `now`, in milliseconds.
    pub fn age_ms(&self, now: EpochMillis) -> i64 {
        now.saturating_sub(self.fetched_at_ms)
    }
}

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// How long a snapshot counts as fresh.
    pub max_age: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            max_age: constants::rate_cache_max_age(),
        }
    }
}

/// Persists the latest rate snapshot under two keys of a [`KeyValueStore`].
///
/// Reads and writes never raise: a missing or unreadable entry loads as
/// `None`, and failed writes are only logged.
///
/// [`KeyValueStore`]: crate::store::KeyValueStore
pub struct RateCache {
    store: SharedStore,
    config: RateCacheConfig,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl RateCache {
    /// Create a rate cache with default configuration.
    pub fn new(store: SharedStore) -> Self {
        Self::with_config(store, RateCacheConfig::default())
    }

    /// Create a rate cache with custom configuration.
    pub fn with_config(store: SharedStore, config: RateCacheConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            write_lock: Mutex::new(()),
        }
    }

    /// Use `clock` to tell stored timestamps in the future from newer snapshots.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_age(&self) -> Duration {
        self.config.max_age
    }

    /// Read the persisted snapshot, fresh or not.
    pub fn load(&self) -> Option<CachedRateSnapshot> {
        match self.try_load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable rate cache");
                None
            }
        }
    }

    /// Read the persisted snapshot only if it is fresh at `now`.
    pub fn load_fresh(&self, now: EpochMillis) -> Option<CachedRateSnapshot> {
        self.load().filter(|s| self.is_fresh(s, now))
    }

    /// Check a snapshot against this cache's freshness window.
    pub fn is_fresh(&self, snapshot: &CachedRateSnapshot, now: EpochMillis) -> bool {
        is_fresh(snapshot.fetched_at_ms, now, self.config.max_age)
    }

    /// Persist a snapshot, overwriting the previous one. Best-effort.
    pub fn store(&self, snapshot: &CachedRateSnapshot) {
        if let Err(e) = self.try_store(snapshot) {
            warn!(error = %e, "Failed to persist rate cache");
        }
    }

    /// Persist a snapshot, reporting failures.
    ///
    /// Returns `Ok(false)` when a newer snapshot is already persisted.
    /// Unreadable timestamps and timestamps ahead of the clock are overwritten.
    pub fn try_store(&self, snapshot: &CachedRateSnapshot) -> FxResult<bool> {
        let _guard = self.write_lock.lock();

        let existing = self
            .store
            .get(keys::EXCHANGE_RATES_TIMESTAMP)?
            .and_then(|raw| match parse_timestamp(&raw) {
                Ok(existing) => Some(existing),
                Err(e) => {
                    warn!(error = %e, "Overwriting unreadable rate cache timestamp");
                    None
                }
            });

        if let Some(existing) = existing {
            if existing > snapshot.fetched_at_ms && existing <= self.clock.now_millis() {
                debug!(
                    existing,
                    incoming = snapshot.fetched_at_ms,
                    "Skipping older rate snapshot"
                );
                return Ok(false);
            }
        }

        let table = serde_json::to_string(&snapshot.table)?;
        self.store.set(keys::EXCHANGE_RATES, &table)?;
        self.store.set(
            keys::EXCHANGE_RATES_TIMESTAMP,
            &snapshot.fetched_at_ms.to_string(),
        )?;

        debug!(
            fetched_at_ms = snapshot.fetched_at_ms,
            currencies = snapshot.table.len(),
            "Stored rate snapshot"
        );
        Ok(true)
    }

    /// Drop the persisted snapshot.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        for key in [keys::EXCHANGE_RATES, keys::EXCHANGE_RATES_TIMESTAMP] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to clear rate cache entry");
            }
        }
    }

    fn try_load(&self) -> FxResult<Option<CachedRateSnapshot>> {
        let Some(raw_timestamp) = self.store.get(keys::EXCHANGE_RATES_TIMESTAMP)? else {
            return Ok(None);
        };
        let fetched_at_ms = parse_timestamp(&raw_timestamp)?;
        let Some(raw) = self.store.get(keys::EXCHANGE_RATES)? else {
            return Ok(None);
        };

        let table: RateTable = serde_json::from_str(&raw)?;
        table.validate()?;

        Ok(Some(CachedRateSnapshot::new(table, fetched_at_ms)))
    }
}

fn parse_timestamp(raw: &str) -> FxResult<EpochMillis> {
    raw.trim()
        .parse::<EpochMillis>()
        .map_err(|e| FxError::Storage(format!("Unreadable cache timestamp {raw:?}: {e}")))
}

/// Shared rate cache.
pub type SharedRateCache = Arc<RateCache>;
