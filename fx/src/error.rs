//! Pricing error types.

use bazaar_common::MonetaryError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching, caching or presenting prices.
#[derive(Debug, Error)]
pub enum FxError {
    /// Caller passed something that is not a usable price.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The rates endpoint could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The rates endpoint did not answer in time.
    #[error("Rates request timed out after {0:?}")]
    Timeout(Duration),

    /// The rates endpoint answered with a non-success status.
    #[error("Rates endpoint returned status {0}")]
    UnexpectedStatus(u16),

    /// The response body is not a recognized rates shape.
    #[error("Malformed rates response: {0}")]
    MalformedResponse(String),

    /// The durable key-value store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored or received value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A rate table or amount violated a monetary invariant.
    #[error(transparent)]
    Monetary(#[from] MonetaryError),
}

impl FxError {
    /// Whether the failure comes from the environment rather than the caller.
    ///
    /// Environmental failures are degraded around; the rest are reported.
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            FxError::Transport(_)
                | FxError::Timeout(_)
                | FxError::UnexpectedStatus(_)
                | FxError::MalformedResponse(_)
                | FxError::Storage(_)
                | FxError::Serialization(_)
        )
    }
}

impl From<std::io::Error> for FxError {
    fn from(e: std::io::Error) -> Self {
        FxError::Storage(e.to_string())
    }
}

/// Result type for pricing operations.
pub type FxResult<T> = Result<T, FxError>;
