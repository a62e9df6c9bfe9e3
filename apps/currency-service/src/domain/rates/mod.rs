//! Exchange Rate Types
//!
//! The rate table maps ISO currency codes to their value relative to the
//! reference currency (EUR). Cross rates are derived on read:
//!
//! ```text
//! rate(base -> destination) = table[destination] / table[base]
//! ```
//!
//! # Invariants
//!
//! - The reference currency is always present with a rate of exactly 1.0
//! - Every entry is a positive, finite number
//! - A lookup for an unknown code is an explicit [`RateError::NotFound`]

mod pair;
mod table;
mod tick;

pub use pair::{InvalidRequest, RatePair};
pub use table::{RateSnapshot, RateTable};
pub use tick::RateTick;

/// The currency every table entry is expressed against.
pub const REFERENCE_CURRENCY: &str = "EUR";

/// Three-letter ISO 4217 currency code.
pub type CurrencyCode = String;

/// Errors raised by rate lookups and table mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateError {
    /// The currency is not present in the table.
    #[error("no rate for currency {0}")]
    NotFound(CurrencyCode),

    /// The rate is not a positive finite number, or violates the reference
    /// currency invariant.
    #[error("invalid rate {rate} for currency {code}")]
    InvalidRate {
        /// Currency the rate was supplied for.
        code: CurrencyCode,
        /// Offending value.
        rate: f64,
    },
}

/// Check a rate before it enters the table.
///
/// # Errors
///
/// Returns [`RateError::InvalidRate`] for zero, negative, NaN or infinite
/// values, and for any reference currency rate other than 1.0.
#[allow(clippy::float_cmp)]
pub fn validate_rate(code: &str, rate: f64) -> Result<(), RateError> {
    let valid = if code == REFERENCE_CURRENCY {
        rate == 1.0
    } else {
        rate.is_finite() && rate > 0.0
    };

    if valid {
        Ok(())
    } else {
        Err(RateError::InvalidRate {
            code: code.to_string(),
            rate,
        })
    }
}
