//! Pricing engine wiring cache, fetcher, resolver and formatter together.

use std::sync::Arc;

use bazaar_common::{supported_currencies, Clock, Currency, SystemClock};
use tracing::info;

use crate::cache::{CachedRateSnapshot, RateCache, RateCacheConfig};
use crate::config::FxConfig;
use crate::error::{FxError, FxResult};
use crate::fetcher::{FetchOutcome, RateFetcher};
use crate::pricing::{ConvertedPrice, FormattedPrice, PriceFormatter};
use crate::provider::{HttpRateSource, RateSource};
use crate::resolver::{CurrencyCatalog, CurrencyDescriptor, CurrencyResolver};
use crate::store::{FileStore, MemoryStore, SharedStore};

/// The public face of the pricing subsystem.
pub struct PricingEngine {
    cache: Arc<RateCache>,
    fetcher: Arc<RateFetcher>,
    resolver: Arc<CurrencyResolver>,
    formatter: PriceFormatter,
}

impl PricingEngine {
    /// Build an engine talking HTTP, storing to disk if a directory is configured.
    pub fn from_config(config: &FxConfig) -> FxResult<Self> {
        config.validate().map_err(FxError::Configuration)?;

        let store: SharedStore = match &config.storage_dir {
            Some(dir) => Arc::new(FileStore::new(dir)),
            None => Arc::new(MemoryStore::new()),
        };
        let catalog = match &config.catalog_path {
            Some(path) => CurrencyCatalog::from_file(path)?,
            None => CurrencyCatalog::shipped(),
        };
        let source = Arc::new(HttpRateSource::new(
            config.rates_url.clone(),
            config.request_timeout,
        )?);

        info!(
            rates_url = %config.rates_url,
            base = %config.base_currency,
            persistent = config.storage_dir.is_some(),
            languages = catalog.len(),
            "Pricing engine configured"
        );

        Ok(Self::with_parts(
            source,
            store,
            Arc::new(SystemClock),
            catalog,
            config,
        ))
    }

    /// Build an engine from explicit collaborators.
    pub fn with_parts(
        source: Arc<dyn RateSource>,
        store: SharedStore,
        clock: Arc<dyn Clock>,
        catalog: CurrencyCatalog,
        config: &FxConfig,
    ) -> Self {
        let cache = Arc::new(RateCache::with_config(
            store.clone(),
            RateCacheConfig {
                max_age: config.cache_max_age,
            },
        )
        .with_clock(clock.clone()));
        let fetcher = Arc::new(RateFetcher::new(
            source,
            cache.clone(),
            clock,
            config.base_currency.clone(),
            config.request_timeout,
        ));
        let resolver = Arc::new(CurrencyResolver::initialize(
            catalog,
            store,
            &config.default_language,
        ));
        let formatter = PriceFormatter::new(resolver.clone(), cache.clone(), fetcher.clone());

        Self {
            cache,
            fetcher,
            resolver,
            formatter,
        }
    }

    /// Render a base amount with cached rates.
    pub fn format_sync(&self, amount_in_base: f64) -> FxResult<FormattedPrice> {
        self.formatter.format_sync(amount_in_base)
    }

    /// Render a base amount after refreshing rates if needed.
    pub async fn format_async(&self, amount_in_base: f64) -> FxResult<FormattedPrice> {
        self.formatter.format_async(amount_in_base).await
    }

    /// Convert a base amount with cached rates.
    pub fn convert_sync(&self, amount_in_base: f64) -> FxResult<ConvertedPrice> {
        self.formatter.convert_sync(amount_in_base)
    }

    /// Convert a base amount after refreshing rates if needed.
    pub async fn convert_async(&self, amount_in_base: f64) -> FxResult<ConvertedPrice> {
        self.formatter.convert_async(amount_in_base).await
    }

    /// Switch display currency by language.
    pub fn set_active_language(&self, language: &str) -> CurrencyDescriptor {
        self.resolver.set_active_language(language)
    }

    /// Current display currency.
    pub fn active_currency(&self) -> CurrencyDescriptor {
        self.resolver.active()
    }

    pub fn resolver(&self) -> &Arc<CurrencyResolver> {
        &self.resolver
    }

    /// Run the fetch chain now, e.g. at startup to warm the sync path.
    pub async fn refresh_rates(&self) -> FetchOutcome {
        self.fetcher.fetch_rates_detailed().await
    }

    /// The persisted snapshot, if any.
    pub fn cached_snapshot(&self) -> Option<CachedRateSnapshot> {
        self.cache.load()
    }

    /// Forget cached rates.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Rate cache cleared");
    }

    /// Currencies the marketplace can price in.
    pub fn supported_currencies(&self) -> Vec<Currency> {
        supported_currencies()
    }

    /// Check if a currency code is supported.
    pub fn is_currency_supported(&self, code: &str) -> bool {
        let currency = Currency::new(code);
        supported_currencies().contains(&currency)
    }
}
