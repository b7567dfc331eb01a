//! Price conversion and presentation in the active display currency.

use bazaar_common::{parse_amount, Currency, Money, RateTable};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::cache::RateCache;
use crate::error::{FxError, FxResult};
use crate::fetcher::{RateFetcher, RateOrigin};
use crate::resolver::{CurrencyDescriptor, CurrencyResolver};

/// Why a conversion fell back to a 1:1 multiplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// No rates have ever been cached.
    NoRates,
    /// The rate table has no entry for the display currency.
    CurrencyMissing(Currency),
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::NoRates => f.write_str("no exchange rates available"),
            Degradation::CurrencyMissing(code) => write!(f, "no exchange rate for {code}"),
        }
    }
}

/// A base amount converted into the display currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedPrice {
    /// Converted, unrounded amount.
    pub amount: Decimal,
    /// Display currency.
    pub currency: Currency,
    /// Multiplier applied to the base amount.
    pub multiplier: Decimal,
    /// Source of the rate table, `None` when no table was available.
    pub origin: Option<RateOrigin>,
    /// Set when the multiplier is a 1:1 stand-in.
    pub degradation: Option<Degradation>,
}

impl ConvertedPrice {
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }

    /// The amount as a float, for callers doing their own arithmetic.
    pub fn as_f64(&self) -> f64 {
        self.amount.to_f64().unwrap_or_default()
    }

    pub fn money(&self) -> Money {
        Money::new(self.amount, self.currency.clone())
    }
}

/// A converted price and its localized rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedPrice {
    pub text: String,
    pub price: ConvertedPrice,
}

impl fmt::Display for FormattedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Converts and renders base-currency amounts for the active display currency.
pub struct PriceFormatter {
    resolver: Arc<CurrencyResolver>,
    cache: Arc<RateCache>,
    fetcher: Arc<RateFetcher>,
}

impl PriceFormatter {
    pub fn new(
        resolver: Arc<CurrencyResolver>,
        cache: Arc<RateCache>,
        fetcher: Arc<RateFetcher>,
    ) -> Self {
        Self {
            resolver,
            cache,
            fetcher,
        }
    }

    pub fn resolver(&self) -> &Arc<CurrencyResolver> {
        &self.resolver
    }

    /// Convert using whatever rates are cached, fresh or stale.
    pub fn convert_sync(&self, amount_in_base: f64) -> FxResult<ConvertedPrice> {
        let amount = validate_amount(amount_in_base)?;
        self.convert_cached(amount, &self.resolver.active())
    }

    /// Format using cached rates. Never waits on the network.
    pub fn format_sync(&self, amount_in_base: f64) -> FxResult<FormattedPrice> {
        let amount = validate_amount(amount_in_base)?;
        let descriptor = self.resolver.active();
        let price = self.convert_cached(amount, &descriptor)?;
        Ok(render(price, &descriptor))
    }

    /// Convert after making sure rates are current.
    pub async fn convert_async(&self, amount_in_base: f64) -> FxResult<ConvertedPrice> {
        let amount = validate_amount(amount_in_base)?;
        let (price, _) = self.convert_fetched(amount).await?;
        Ok(price)
    }

    /// Format after making sure rates are current.
    pub async fn format_async(&self, amount_in_base: f64) -> FxResult<FormattedPrice> {
        let amount = validate_amount(amount_in_base)?;
        let (price, descriptor) = self.convert_fetched(amount).await?;
        Ok(render(price, &descriptor))
    }

    fn convert_cached(
        &self,
        amount: Decimal,
        descriptor: &CurrencyDescriptor,
    ) -> FxResult<ConvertedPrice> {
        match self.cache.load() {
            Some(snapshot) => {
                let origin = if self.cache.is_fresh(&snapshot, self.fetcher.clock().now_millis()) {
                    RateOrigin::FreshCache
                } else {
                    RateOrigin::StaleCache
                };
                apply_rate(amount, descriptor, &snapshot.table, Some(origin))
            }
            None => Ok(ConvertedPrice {
                amount,
                currency: descriptor.code.clone(),
                multiplier: Decimal::ONE,
                origin: None,
                degradation: Some(Degradation::NoRates),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn convert_fetched(
        &self,
        amount: Decimal,
    ) -> FxResult<(ConvertedPrice, CurrencyDescriptor)> {
        let outcome = self.fetcher.fetch_rates_detailed().await;
        // Read after the fetch so a language change made meanwhile is honored.
        let descriptor = self.resolver.active();
        let price = apply_rate(amount, &descriptor, &outcome.table, Some(outcome.origin))?;
        Ok((price, descriptor))
    }
}

fn validate_amount(amount: f64) -> FxResult<Decimal> {
    parse_amount(amount).map_err(|e| FxError::InvalidArgument(e.to_string()))
}

fn apply_rate(
    amount: Decimal,
    descriptor: &CurrencyDescriptor,
    table: &RateTable,
    origin: Option<RateOrigin>,
) -> FxResult<ConvertedPrice> {
    let (multiplier, degradation) = match table.multiplier(&descriptor.code) {
        Some(rate) => (rate, None),
        None => {
            warn!(
                currency = %descriptor.code,
                base = %table.base(),
                "Exchange rate not available, showing base amount"
            );
            (
                Decimal::ONE,
                Some(Degradation::CurrencyMissing(descriptor.code.clone())),
            )
        }
    };

    let converted = amount.checked_mul(multiplier).ok_or_else(|| {
        FxError::InvalidArgument(format!(
            "amount {amount} is too large to show in {}",
            descriptor.code
        ))
    })?;

    Ok(ConvertedPrice {
        amount: converted,
        currency: descriptor.code.clone(),
        multiplier,
        origin,
        degradation,
    })
}

fn render(price: ConvertedPrice, descriptor: &CurrencyDescriptor) -> FormattedPrice {
    let text = descriptor
        .number_locale()
        .format_money(&price.money(), &descriptor.symbol);
    FormattedPrice { text, price }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedRateSnapshot;
    use crate::provider::MockRateSource;
    use crate::resolver::CurrencyCatalog;
    use crate::store::MemoryStore;
    use bazaar_common::{default_rate_table, now_millis, SystemClock};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    struct Harness {
        source: Arc<MockRateSource>,
        cache: Arc<RateCache>,
        formatter: PriceFormatter,
    }

    fn euro_catalog() -> CurrencyCatalog {
        CurrencyCatalog::new(
            "en",
            BTreeMap::from([
                (
                    "en".to_string(),
                    CurrencyDescriptor::new(Currency::eur(), "€", "Euro", "en-IE"),
                ),
                (
                    "fr".to_string(),
                    CurrencyDescriptor::new(Currency::eur(), "€", "Euro", "fr-FR"),
                ),
                (
                    "ar".to_string(),
                    CurrencyDescriptor::new(Currency::tnd(), "د.ت", "الدينار التونسي", "ar-TN"),
                ),
            ]),
        )
        .unwrap()
    }

    fn setup(catalog: CurrencyCatalog, language: &str, source: MockRateSource) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(source);
        let cache = Arc::new(RateCache::new(store.clone()));
        let resolver = Arc::new(CurrencyResolver::initialize(catalog, store, language));
        let fetcher = Arc::new(RateFetcher::new(
            source.clone(),
            cache.clone(),
            Arc::new(SystemClock),
            Currency::usd(),
            Duration::seconds(5),
        ));
        let formatter = PriceFormatter::new(resolver, cache.clone(), fetcher);
        Harness {
            source,
            cache,
            formatter,
        }
    }

    #[test]
    fn test_convert_sync_with_cached_eur() {
        let h = setup(euro_catalog(), "en", MockRateSource::failing());
        h.cache
            .store(&CachedRateSnapshot::new(default_rate_table(), now_millis()));

        let price = h.formatter.convert_sync(100.0).unwrap();

        assert_eq!(price.amount, dec!(85));
        assert!((price.as_f64() - 85.0).abs() < 1e-9);
        assert_eq!(price.origin, Some(RateOrigin::FreshCache));
        assert!(!price.is_degraded());
    }

    #[test]
    fn test_format_sync_eur() {
        let h = setup(euro_catalog(), "en", MockRateSource::failing());
        h.cache
            .store(&CachedRateSnapshot::new(default_rate_table(), now_millis()));

        let formatted = h.formatter.format_sync(100.0).unwrap();

        assert_eq!(formatted.text, "€85.00");
        assert_eq!(formatted.to_string(), "€85.00");
    }

    #[test]
    fn test_format_sync_is_idempotent() {
        let h = setup(euro_catalog(), "fr", MockRateSource::failing());
        h.cache
            .store(&CachedRateSnapshot::new(default_rate_table(), now_millis()));

        let first = h.formatter.format_sync(1234.5).unwrap();
        let second = h.formatter.format_sync(1234.5).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.text, "1\u{202f}049,33\u{a0}€");
    }

    #[test]
    fn test_sync_without_cache_is_identity() {
        let h = setup(euro_catalog(), "en", MockRateSource::failing());

        let price = h.formatter.convert_sync(100.0).unwrap();

        assert_eq!(price.amount, dec!(100));
        assert_eq!(price.multiplier, Decimal::ONE);
        assert_eq!(price.degradation, Some(Degradation::NoRates));
        assert_eq!(h.formatter.format_sync(100.0).unwrap().text, "€100.00");
        assert_eq!(h.source.calls(), 0);
    }

    #[test]
    fn test_sync_uses_stale_cache() {
        let h = setup(euro_catalog(), "en", MockRateSource::failing());
        h.cache.store(&CachedRateSnapshot::new(
            default_rate_table(),
            now_millis() - 7_200_000,
        ));

        let price = h.formatter.convert_sync(10.0).unwrap();

        assert_eq!(price.amount, dec!(8.5));
        assert_eq!(price.origin, Some(RateOrigin::StaleCache));
    }

    #[test]
    fn test_invalid_amounts_are_errors() {
        let h = setup(euro_catalog(), "en", MockRateSource::failing());

        assert!(matches!(
            h.formatter.convert_sync(-5.0),
            Err(FxError::InvalidArgument(_))
        ));
        assert!(matches!(
            h.formatter.format_sync(f64::NAN),
            Err(FxError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_format_async_falls_back_to_defaults() {
        let h = setup(euro_catalog(), "en", MockRateSource::failing());

        let formatted = h.formatter.format_async(100.0).await.unwrap();

        assert_eq!(formatted.text, "€85.00");
        assert_eq!(formatted.price.origin, Some(RateOrigin::Defaults));
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_format_async_uses_network_and_warms_sync_path() {
        let table = RateTable::from_rates(Currency::usd(), [(Currency::eur(), dec!(0.9))]).unwrap();
        let h = setup(euro_catalog(), "en", MockRateSource::answering(table));

        let formatted = h.formatter.format_async(20.0).await.unwrap();
        assert_eq!(formatted.text, "€18.00");
        assert_eq!(formatted.price.origin, Some(RateOrigin::Network));

        let sync = h.formatter.convert_sync(20.0).unwrap();
        assert_eq!(sync.amount, dec!(18));
        assert_eq!(sync.origin, Some(RateOrigin::FreshCache));
    }

    #[tokio::test]
    async fn test_missing_currency_degrades_to_identity() {
        let table = RateTable::from_rates(Currency::usd(), [(Currency::eur(), dec!(0.9))]).unwrap();
        let h = setup(euro_catalog(), "ar", MockRateSource::answering(table));

        let price = h.formatter.convert_async(100.0).await.unwrap();

        assert_eq!(price.currency, Currency::tnd());
        assert_eq!(price.multiplier, Decimal::ONE);
        assert_eq!(price.amount, dec!(100));
        assert_eq!(
            price.degradation,
            Some(Degradation::CurrencyMissing(Currency::tnd()))
        );
    }

    #[tokio::test]
    async fn test_shipped_catalog_renders_dinars() {
        let table = RateTable::from_rates(Currency::usd(), [(Currency::tnd(), dec!(3.1))]).unwrap();
        let h = setup(CurrencyCatalog::shipped(), "fr", MockRateSource::answering(table));

        let formatted = h.formatter.format_async(1000.0).await.unwrap();

        assert_eq!(formatted.text, "3\u{202f}100,000\u{a0}DT");
    }

    #[tokio::test]
    async fn test_amount_too_large_for_currency_is_an_error() {
        let catalog = CurrencyCatalog::new(
            "ko",
            BTreeMap::from([(
                "ko".to_string(),
                CurrencyDescriptor::new(Currency::new("KRW"), "₩", "원", "ko-KR"),
            )]),
        )
        .unwrap();
        let h = setup(catalog, "ko", MockRateSource::failing());

        assert!(matches!(
            h.formatter.format_async(1e27).await,
            Err(FxError::InvalidArgument(_))
        ));

        h.cache
            .store(&CachedRateSnapshot::new(default_rate_table(), now_millis()));
        assert!(matches!(
            h.formatter.convert_sync(1e27),
            Err(FxError::InvalidArgument(_))
        ));
        assert_eq!(h.formatter.convert_sync(1000.0).unwrap().amount, dec!(1180000));
    }

    #[test]
    fn test_language_switch_changes_output() {
        let h = setup(euro_catalog(), "en", MockRateSource::failing());
        h.cache
            .store(&CachedRateSnapshot::new(default_rate_table(), now_millis()));

        assert_eq!(h.formatter.format_sync(2.0).unwrap().text, "€1.70");

        h.formatter.resolver().set_active_language("fr");
        assert_eq!(h.formatter.format_sync(2.0).unwrap().text, "1,70\u{a0}€");
    }
}
