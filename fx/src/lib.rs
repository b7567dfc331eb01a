//! Bazaar FX
//!
//! Exchange rates and price presentation for the marketplace storefront.
//!
//! # Features
//!
//! - Durable rate cache with a one-hour freshness window
//! - Fetch chain: fresh cache, rates endpoint, stale cache, built-in table
//! - Language-driven display currency with persisted preference
//! - Locale-aware price rendering with an explicit degraded-mode flag
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_fx::{FxConfig, PricingEngine};
//!
//! let engine = PricingEngine::from_config(&FxConfig::from_env())?;
//!
//! // Instant, from whatever rates are cached
//! let label = engine.format_sync(49.90)?;
//!
//! // Refreshes rates first if they are stale
//! let label = engine.format_async(49.90).await?;
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod pricing;
pub mod provider;
pub mod resolver;
pub mod store;

pub use cache::{CachedRateSnapshot, RateCache};
pub use config::FxConfig;
pub use engine::PricingEngine;
pub use error::{FxError, FxResult};
pub use fetcher::{FetchOutcome, RateFetcher, RateOrigin};
pub use pricing::{ConvertedPrice, Degradation, FormattedPrice, PriceFormatter};
pub use provider::{HttpRateSource, RateSource, RatesPayload, RatesShape};
pub use resolver::{CurrencyCatalog, CurrencyDescriptor, CurrencyResolver};
pub use store::{FileStore, KeyValueStore, MemoryStore};
