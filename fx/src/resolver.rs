//! Language to display-currency resolution and the active currency context.

use bazaar_common::{Currency, NumberLocale};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{FxError, FxResult};
use crate::store::{keys, SharedStore};

/// How prices are shown for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyDescriptor {
    /// Currency the price is converted into.
    pub code: Currency,
    /// Symbol printed next to the number.
    pub symbol: String,
    /// Human-readable currency name in that language.
    pub display_name: String,
    /// BCP 47 tag driving separators and symbol placement.
    pub numeric_locale: String,
}

impl CurrencyDescriptor {
    pub fn new(
        code: Currency,
        symbol: impl Into<String>,
        display_name: impl Into<String>,
        numeric_locale: impl Into<String>,
    ) -> Self {
        Self {
            code,
            symbol: symbol.into(),
            display_name: display_name.into(),
            numeric_locale: numeric_locale.into(),
        }
    }

    /// Number formatting rules for this descriptor's locale.
    pub fn number_locale(&self) -> NumberLocale {
        NumberLocale::for_tag(&self.numeric_locale)
    }
}

/// Static language → descriptor table with a designated fallback language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyCatalog {
    fallback_language: String,
    fallback: CurrencyDescriptor,
    currencies: BTreeMap<String, CurrencyDescriptor>,
}

/// On-disk form of a catalog.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    fallback_language: String,
    currencies: BTreeMap<String, CurrencyDescriptor>,
}

impl CurrencyCatalog {
    /// Build a catalog, checking that the fallback language is present.
    pub fn new(
        fallback_language: impl Into<String>,
        currencies: BTreeMap<String, CurrencyDescriptor>,
    ) -> FxResult<Self> {
        let fallback_language = normalize_language(&fallback_language.into());
        let currencies: BTreeMap<String, CurrencyDescriptor> = currencies
            .into_iter()
            .map(|(lang, descriptor)| (normalize_language(&lang), descriptor))
            .collect();

        if let Some((lang, d)) = currencies.iter().find(|(_, d)| !d.code.is_well_formed()) {
            return Err(FxError::Configuration(format!(
                "Language {lang:?} maps to malformed currency {:?}",
                d.code.code()
            )));
        }
        let fallback = currencies.get(&fallback_language).cloned().ok_or_else(|| {
            FxError::Configuration(format!(
                "Fallback language {fallback_language:?} has no currency"
            ))
        })?;

        Ok(Self {
            fallback_language,
            fallback,
            currencies,
        })
    }

    /// The catalog the storefront ships with: every language prices in dinars.
    pub fn shipped() -> Self {
        let dinar = |symbol: &str, name: &str, locale: &str| {
            CurrencyDescriptor::new(Currency::tnd(), symbol, name, locale)
        };
        let english = dinar("DT", "Tunisian Dinar", "en-TN");

        let currencies = BTreeMap::from([
            ("fr".to_string(), dinar("DT", "Dinar Tunisien", "fr-TN")),
            ("en".to_string(), english.clone()),
            ("ar".to_string(), dinar("د.ت", "الدينار التونسي", "ar-TN")),
            ("es".to_string(), dinar("DT", "Dinar Tunecino", "es-TN")),
            ("de".to_string(), dinar("DT", "Tunesischer Dinar", "de-TN")),
            ("it".to_string(), dinar("DT", "Dinaro Tunisino", "it-TN")),
            ("pt".to_string(), dinar("DT", "Dinar Tunisiano", "pt-TN")),
            ("ru".to_string(), dinar("DT", "Тунисский динар", "ru-TN")),
            ("zh".to_string(), dinar("DT", "突尼斯第纳尔", "zh-TN")),
            ("ja".to_string(), dinar("DT", "チュニジア・ディナール", "ja-TN")),
            ("ko".to_string(), dinar("DT", "튀니지 디나르", "ko-TN")),
            ("hi".to_string(), dinar("DT", "ट्यूनीशियाई दिनार", "hi-TN")),
        ]);

        Self {
            fallback_language: "en".to_string(),
            fallback: english,
            currencies,
        }
    }

    /// Parse a catalog from its JSON form.
    pub fn from_json(json: &str) -> FxResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.fallback_language, file.currencies)
    }

    /// Render the catalog in the JSON form [`from_json`](Self::from_json) reads.
    pub fn to_json(&self) -> FxResult<String> {
        let file = CatalogFile {
            fallback_language: self.fallback_language.clone(),
            currencies: self.currencies.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Load a catalog from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> FxResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            FxError::Configuration(format!("Cannot read catalog {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn fallback_language(&self) -> &str {
        &self.fallback_language
    }

    /// Look up a language without falling back.
    ///
    /// Tries the full tag, then its primary subtag (`fr-CA` → `fr`).
    pub fn lookup(&self, language: &str) -> Option<&CurrencyDescriptor> {
        let normalized = normalize_language(language);
        self.currencies.get(&normalized).or_else(|| {
            let primary = normalized.split('-').next().unwrap_or_default();
            self.currencies.get(primary)
        })
    }

    /// Resolve a language, using the fallback language when it is unmapped.
    pub fn resolve(&self, language: &str) -> &CurrencyDescriptor {
        self.lookup(language).unwrap_or(&self.fallback)
    }

    /// Languages the catalog maps, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.currencies.keys().map(String::as_str)
    }

    /// First language (alphabetically) that displays `currency`.
    pub fn language_for_currency(&self, currency: &Currency) -> Option<&str> {
        self.currencies
            .iter()
            .find(|(_, d)| &d.code == currency)
            .map(|(lang, _)| lang.as_str())
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

impl Default for CurrencyCatalog {
    fn default() -> Self {
        Self::shipped()
    }
}

fn normalize_language(language: &str) -> String {
    language.trim().replace('_', "-").to_ascii_lowercase()
}

#[derive(Debug, Clone)]
struct ActiveCurrency {
    language: String,
    descriptor: CurrencyDescriptor,
}

/// Tracks the user's display currency.
///
/// One resolver is shared (via `Arc`) by everything that formats prices
/// for a session; it is the only place the active currency changes.
pub struct CurrencyResolver {
    catalog: CurrencyCatalog,
    store: SharedStore,
    active: RwLock<ActiveCurrency>,
}

impl CurrencyResolver {
    /// Start a resolver, restoring the persisted preference if there is one.
    ///
    /// Order: stored language, then a language matching the stored currency
    /// code, then `default_language`.
    pub fn initialize(catalog: CurrencyCatalog, store: SharedStore, default_language: &str) -> Self {
        let stored_language = read_preference(&store, keys::PREFERRED_LOCALE);
        let stored_currency = read_preference(&store, keys::PREFERRED_CURRENCY);

        let language = stored_language
            .or_else(|| {
                stored_currency.and_then(|code| {
                    catalog
                        .language_for_currency(&Currency::new(code))
                        .map(str::to_string)
                })
            })
            .unwrap_or_else(|| default_language.to_string());
        let language = normalize_language(&language);

        let descriptor = catalog.resolve(&language).clone();
        info!(
            language = %language,
            currency = %descriptor.code,
            "Display currency initialized"
        );

        Self {
            catalog,
            store,
            active: RwLock::new(ActiveCurrency {
                language,
                descriptor,
            }),
        }
    }

    pub fn catalog(&self) -> &CurrencyCatalog {
        &self.catalog
    }

    /// Resolve a language without touching the active state.
    pub fn resolve(&self, language: &str) -> CurrencyDescriptor {
        self.catalog.resolve(language).clone()
    }

    /// Switch the display currency to the one for `language` and persist it.
    pub fn set_active_language(&self, language: &str) -> CurrencyDescriptor {
        let language = normalize_language(language);
        let descriptor = self.resolve(&language);

        if self.catalog.lookup(&language).is_none() {
            debug!(
                language = %language,
                fallback = self.catalog.fallback_language(),
                "Language not in catalog, using fallback currency"
            );
        }

        {
            let mut active = self.active.write();
            active.language = language.clone();
            active.descriptor = descriptor.clone();
        }

        for (key, value) in [
            (keys::PREFERRED_LOCALE, language.as_str()),
            (keys::PREFERRED_CURRENCY, descriptor.code.code()),
        ] {
            if let Err(e) = self.store.set(key, value) {
                warn!(key, error = %e, "Failed to persist currency preference");
            }
        }

        info!(language = %language, currency = %descriptor.code, "Display currency changed");
        descriptor
    }

    /// The current display currency.
    pub fn active(&self) -> CurrencyDescriptor {
        self.active.read().descriptor.clone()
    }

    /// The language the current display currency was chosen by.
    pub fn active_language(&self) -> String {
        self.active.read().language.clone()
    }
}

fn read_preference(store: &SharedStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(key, error = %e, "Failed to read currency preference");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    const SHIPPED_LANGUAGES: [&str; 12] = [
        "fr", "en", "ar", "es", "de", "it", "pt", "ru", "zh", "ja", "ko", "hi",
    ];

    fn multi_currency_catalog() -> CurrencyCatalog {
        CurrencyCatalog::from_json(
            r#"{
                "fallback_language": "en",
                "currencies": {
                    "en": {"code": "USD", "symbol": "$", "display_name": "US Dollar", "numeric_locale": "en-US"},
                    "de": {"code": "EUR", "symbol": "€", "display_name": "Euro", "numeric_locale": "de-DE"},
                    "ja": {"code": "JPY", "symbol": "¥", "display_name": "日本円", "numeric_locale": "ja-JP"}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_every_shipped_language_resolves() {
        let catalog = CurrencyCatalog::shipped();
        assert_eq!(catalog.len(), 12);

        for lang in SHIPPED_LANGUAGES {
            let descriptor = catalog.lookup(lang).unwrap();
            assert_eq!(descriptor.code, Currency::tnd());
            assert!(descriptor.numeric_locale.starts_with(lang));
        }
    }

    #[test]
    fn test_unmapped_language_uses_fallback() {
        let catalog = CurrencyCatalog::shipped();
        let fallback = catalog.resolve("en").clone();

        assert_eq!(catalog.resolve("sw"), &fallback);
        assert_eq!(catalog.resolve(""), &fallback);
        assert!(catalog.lookup("sw").is_none());
    }

    #[test]
    fn test_lookup_normalizes_tags() {
        let catalog = multi_currency_catalog();

        assert_eq!(catalog.resolve("DE").code, Currency::eur());
        assert_eq!(catalog.resolve("de_AT").code, Currency::eur());
        assert_eq!(catalog.resolve("ja-JP").code, Currency::jpy());
    }

    #[test]
    fn test_catalog_requires_fallback_entry() {
        let result = CurrencyCatalog::from_json(
            r#"{"fallback_language": "xx", "currencies": {
                "en": {"code": "USD", "symbol": "$", "display_name": "US Dollar", "numeric_locale": "en-US"}
            }}"#,
        );
        assert!(matches!(result, Err(FxError::Configuration(_))));
    }

    #[test]
    fn test_catalog_rejects_malformed_code() {
        let result = CurrencyCatalog::from_json(
            r#"{"fallback_language": "en", "currencies": {
                "en": {"code": "DOLLARS", "symbol": "$", "display_name": "US Dollar", "numeric_locale": "en-US"}
            }}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_initialize_defaults() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let resolver = CurrencyResolver::initialize(multi_currency_catalog(), store, "de");

        assert_eq!(resolver.active_language(), "de");
        assert_eq!(resolver.active().code, Currency::eur());
    }

    #[test]
    fn test_set_active_language_persists() {
        let store = Arc::new(MemoryStore::new());
        let resolver = CurrencyResolver::initialize(multi_currency_catalog(), store.clone(), "en");

        let descriptor = resolver.set_active_language("ja");

        assert_eq!(descriptor.code, Currency::jpy());
        assert_eq!(resolver.active(), descriptor);
        assert_eq!(store.get(keys::PREFERRED_LOCALE).unwrap().as_deref(), Some("ja"));
        assert_eq!(store.get(keys::PREFERRED_CURRENCY).unwrap().as_deref(), Some("JPY"));

        let restarted = CurrencyResolver::initialize(multi_currency_catalog(), store, "en");
        assert_eq!(restarted.active_language(), "ja");
        assert_eq!(restarted.active().code, Currency::jpy());
    }

    #[test]
    fn test_initialize_from_stored_currency_only() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::PREFERRED_CURRENCY, "EUR").unwrap();

        let resolver = CurrencyResolver::initialize(multi_currency_catalog(), store, "en");

        assert_eq!(resolver.active_language(), "de");
        assert_eq!(resolver.active().code, Currency::eur());
    }

    #[test]
    fn test_set_unmapped_language() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let resolver = CurrencyResolver::initialize(multi_currency_catalog(), store, "de");

        let descriptor = resolver.set_active_language("sw");

        assert_eq!(descriptor.code, Currency::usd());
        assert_eq!(resolver.active_language(), "sw");
    }

    #[test]
    fn test_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, CurrencyCatalog::shipped().to_json().unwrap()).unwrap();

        let loaded = CurrencyCatalog::from_file(&path).unwrap();
        assert_eq!(loaded, CurrencyCatalog::shipped());

        assert!(CurrencyCatalog::from_file(dir.path().join("missing.json")).is_err());
    }
}
