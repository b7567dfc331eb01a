//! Rate fetching with cache-first lookup and layered fallbacks.

use bazaar_common::{default_rate_table, Clock, Currency, DurationExt, RateTable};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CachedRateSnapshot, RateCache};
use crate::error::{FxError, FxResult};
use crate::provider::{RateSource, RatesPayload};

/// Where a rate table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateOrigin {
    /// Cached and younger than the freshness window.
    FreshCache,
    /// Fetched from the rates endpoint just now.
    Network,
    /// Cached but past the freshness window; the network fetch failed.
    StaleCache,
    /// The hardcoded table; nothing else was available.
    Defaults,
}

impl RateOrigin {
    /// Whether the table is not as current as it should be.
    pub fn is_degraded(&self) -> bool {
        matches!(self, RateOrigin::StaleCache | RateOrigin::Defaults)
    }
}

impl fmt::Display for RateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RateOrigin::FreshCache => "fresh-cache",
            RateOrigin::Network => "network",
            RateOrigin::StaleCache => "stale-cache",
            RateOrigin::Defaults => "defaults",
        };
        f.write_str(name)
    }
}

/// A rate table and the step of the fallback chain that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub table: RateTable,
    pub origin: RateOrigin,
}

/// Obtains a current rate table. Never fails.
pub struct RateFetcher {
    source: Arc<dyn RateSource>,
    cache: Arc<RateCache>,
    clock: Arc<dyn Clock>,
    base: Currency,
    request_timeout: Duration,
}

impl RateFetcher {
    /// Create a new fetcher.
    pub fn new(
        source: Arc<dyn RateSource>,
        cache: Arc<RateCache>,
        clock: Arc<dyn Clock>,
        base: Currency,
        request_timeout: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            clock,
            base,
            request_timeout,
        }
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Get the current rate table.
    pub async fn fetch_rates(&self) -> RateTable {
        self.fetch_rates_detailed().await.table
    }

    /// Get the current rate table along with where it came from.
    ///
    /// Order: fresh cache, network, stale cache, built-in defaults.
    #[instrument(skip(self), fields(source = self.source.name(), base = %self.base))]
    pub async fn fetch_rates_detailed(&self) -> FetchOutcome {
        let now = self.clock.now_millis();

        if let Some(snapshot) = self.cache.load_fresh(now) {
            debug!(age_ms = snapshot.age_ms(now), "Using fresh cached rates");
            return FetchOutcome {
                table: snapshot.table,
                origin: RateOrigin::FreshCache,
            };
        }

        match self.request().await {
            Ok(payload) => {
                let fetched_at_ms = self.clock.now_millis();
                let snapshot = CachedRateSnapshot::new(payload.table, fetched_at_ms);
                self.cache.store(&snapshot);

                info!(currencies = snapshot.table.len(), "Refreshed exchange rates");
                return FetchOutcome {
                    table: snapshot.table,
                    origin: RateOrigin::Network,
                };
            }
            Err(e) => {
                warn!(error = %e, "Exchange rate fetch failed, falling back");
            }
        }

        if let Some(snapshot) = self.cache.load() {
            warn!(age_ms = snapshot.age_ms(now), "Using stale cached rates");
            return FetchOutcome {
                table: snapshot.table,
                origin: RateOrigin::StaleCache,
            };
        }

        warn!("No cached rates available, using built-in defaults");
        FetchOutcome {
            table: default_rate_table(),
            origin: RateOrigin::Defaults,
        }
    }

    async fn request(&self) -> FxResult<RatesPayload> {
        let timeout = self.request_timeout.as_std();
        let payload = tokio::time::timeout(timeout, self.source.fetch_rates(&self.base))
            .await
            .map_err(|_| FxError::Timeout(timeout))??;

        if payload.table.base() != &self.base {
            return Err(FxError::MalformedResponse(format!(
                "rates are relative to {}, expected {}",
                payload.table.base(),
                self.base
            )));
        }

        Ok(payload)
    }
}
