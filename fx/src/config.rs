//! Pricing configuration.

use bazaar_common::{constants, Currency};
use chrono::Duration;
use std::path::PathBuf;

/// Main pricing configuration.
#[derive(Debug, Clone)]
pub struct FxConfig {
    /// Backend endpoint serving the rates JSON.
    pub rates_url: String,
    /// Currency product prices are stored in.
    pub base_currency: Currency,
    /// How long fetched rates count as fresh.
    pub cache_max_age: Duration,
    /// Timeout for one rates request.
    pub request_timeout: Duration,
    /// Directory for durable cache and preferences; in-memory when unset.
    pub storage_dir: Option<PathBuf>,
    /// Language used when no preference has been stored.
    pub default_language: String,
    /// JSON catalog replacing the shipped language → currency table.
    pub catalog_path: Option<PathBuf>,
    /// Log level.
    pub log_level: String,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            rates_url: "http://localhost:8000/api/exchange-rates".to_string(),
            base_currency: Currency::usd(),
            cache_max_age: constants::rate_cache_max_age(),
            request_timeout: constants::rates_request_timeout(),
            storage_dir: None,
            default_language: "fr".to_string(),
            catalog_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("BAZAAR_RATES_URL") {
            config.rates_url = url;
        }

        if let Ok(code) = std::env::var("BAZAAR_BASE_CURRENCY") {
            config.base_currency = Currency::new(code);
        }

        if let Ok(secs) = std::env::var("BAZAAR_RATES_MAX_AGE_SECS") {
            if let Ok(secs) = secs.parse() {
                config.cache_max_age = Duration::seconds(secs);
            }
        }

        if let Ok(secs) = std::env::var("BAZAAR_RATES_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.request_timeout = Duration::seconds(secs);
            }
        }

        if let Ok(dir) = std::env::var("BAZAAR_STORAGE_DIR") {
            if !dir.is_empty() {
                config.storage_dir = Some(PathBuf::from(dir));
            }
        }

        if let Ok(lang) = std::env::var("BAZAAR_DEFAULT_LANGUAGE") {
            config.default_language = lang;
        }

        if let Ok(path) = std::env::var("BAZAAR_CURRENCY_CATALOG") {
            if !path.is_empty() {
                config.catalog_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.rates_url.is_empty() {
            return Err("Rates URL cannot be empty".to_string());
        }

        if !(self.rates_url.starts_with("http://") || self.rates_url.starts_with("https://")) {
            return Err(format!("Rates URL must be http(s): {}", self.rates_url));
        }

        if !self.base_currency.is_well_formed() {
            return Err(format!("Invalid base currency: {}", self.base_currency));
        }

        if self.cache_max_age <= Duration::zero() {
            return Err("Cache max age must be positive".to_string());
        }

        if self.request_timeout <= Duration::zero() {
            return Err("Request timeout must be positive".to_string());
        }

        if self.request_timeout > constants::max_rates_request_timeout() {
            return Err("Request timeout cannot exceed 60 seconds".to_string());
        }

        if self.default_language.trim().is_empty() {
            return Err("Default language cannot be empty".to_string());
        }

        Ok(())
    }
}
