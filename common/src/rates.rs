//! Exchange rate tables.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MonetaryError;
use crate::monetary::Currency;

/// Multipliers from one unit of a base currency to other currencies.
///
/// The base currency always maps to exactly one. Tables are replaced
/// wholesale; there is no merge operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    base: Currency,
    rates: BTreeMap<Currency, Decimal>,
}

impl RateTable {
    /// Create a table holding only the base currency.
    pub fn new(base: Currency) -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(base.clone(), Decimal::ONE);
        Self { base, rates }
    }

    /// Build a table from raw multipliers.
    ///
    /// Inserts the base entry when missing and rejects non-positive rates.
    pub fn from_rates<I>(base: Currency, rates: I) -> Result<Self, MonetaryError>
    where
        I: IntoIterator<Item = (Currency, Decimal)>,
    {
        let mut table = Self::new(base);
        for (currency, rate) in rates {
            table.insert(currency, rate)?;
        }
        Ok(table)
    }

    /// Add or replace a single multiplier.
    pub fn insert(&mut self, currency: Currency, rate: Decimal) -> Result<(), MonetaryError> {
        if currency == self.base {
            if rate != Decimal::ONE {
                return Err(MonetaryError::BaseRateNotUnity { currency, rate });
            }
            return Ok(());
        }
        if rate <= Decimal::ZERO {
            return Err(MonetaryError::InvalidRate {
                currency,
                rate: rate.to_string(),
            });
        }
        self.rates.insert(currency, rate);
        Ok(())
    }

    /// Re-check the invariants of a table that came from outside, e.g. storage.
    pub fn validate(&self) -> Result<(), MonetaryError> {
        match self.rates.get(&self.base) {
            Some(rate) if *rate == Decimal::ONE => {}
            Some(rate) => {
                return Err(MonetaryError::BaseRateNotUnity {
                    currency: self.base.clone(),
                    rate: *rate,
                })
            }
            None => {
                return Err(MonetaryError::InvalidRate {
                    currency: self.base.clone(),
                    rate: "missing".to_string(),
                })
            }
        }
        if let Some((currency, rate)) = self.rates.iter().find(|(_, r)| **r <= Decimal::ZERO) {
            return Err(MonetaryError::InvalidRate {
                currency: currency.clone(),
                rate: rate.to_string(),
            });
        }
        Ok(())
    }

    /// The currency every multiplier is relative to.
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Multiplier for a currency, if the table has one.
    pub fn multiplier(&self, currency: &Currency) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }

    /// Check if the table carries a rate for the currency.
    pub fn contains(&self, currency: &Currency) -> bool {
        self.rates.contains_key(currency)
    }

    /// Currencies in the table, sorted by code.
    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.rates.keys()
    }

    /// Iterate over `(currency, multiplier)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Decimal)> {
        self.rates.iter()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Static multipliers relative to USD, used when nothing else is available.
const DEFAULT_RATES: [(&str, i64, u32); 14] = [
    ("EUR", 85, 2),
    ("GBP", 73, 2),
    ("JPY", 110, 0),
    ("CAD", 125, 2),
    ("AUD", 135, 2),
    ("CHF", 92, 2),
    ("CNY", 645, 2),
    ("SAR", 375, 2),
    ("RUB", 75, 0),
    ("INR", 74, 0),
    ("KRW", 1180, 0),
    ("BRL", 52, 1),
    ("MXN", 20, 0),
    ("ZAR", 145, 1),
];

/// The hardcoded fallback-of-last-resort table.
pub fn default_rate_table() -> RateTable {
    let mut table = RateTable::new(Currency::usd());
    for (code, mantissa, scale) in DEFAULT_RATES {
        table
            .rates
            .insert(Currency::new(code), Decimal::new(mantissa, scale));
    }
    table
}

/// Currency codes the marketplace knows how to price in.
pub fn supported_currencies() -> Vec<Currency> {
    std::iter::once(Currency::usd())
        .chain(DEFAULT_RATES.iter().map(|(code, _, _)| Currency::new(*code)))
        .collect()
}
