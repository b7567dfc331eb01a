//! Bazaar Common Types
//!
//! Shared types for Bazaar pricing: currency codes, exchange rate tables,
//! locale number formatting and time helpers.

pub mod monetary;
pub mod rates;
pub mod locale;
pub mod error;
pub mod time;

pub use monetary::*;
pub use rates::*;
pub use locale::*;
pub use error::*;
pub use time::*;
