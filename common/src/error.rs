//! Error types for monetary values and rate tables.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::Currency;

/// Errors raised while building amounts or rate tables.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonetaryError {
    /// Amount is not usable as a price.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: f64, reason: &'static str },

    /// A multiplier that is zero, negative or not representable.
    #[error("Invalid rate for {currency}: {rate}")]
    InvalidRate { currency: Currency, rate: String },

    /// The base currency must map to exactly one.
    #[error("Base currency {currency} has rate {rate}, expected 1")]
    BaseRateNotUnity { currency: Currency, rate: Decimal },
}

impl MonetaryError {
    /// Get error code for logs and diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            MonetaryError::InvalidAmount { .. } => "INVALID_AMOUNT",
            MonetaryError::InvalidRate { .. } => "INVALID_RATE",
            MonetaryError::BaseRateNotUnity { .. } => "BASE_RATE_NOT_UNITY",
        }
    }
}
