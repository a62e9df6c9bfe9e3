//! Currency pairs requested by clients.

use std::fmt;

use super::CurrencyCode;

/// An ordered (base, destination) pair.
///
/// Construction through [`RatePair::new`] guarantees the two currencies
/// differ; a pair is only a lookup key and carries no rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RatePair {
    base: CurrencyCode,
    destination: CurrencyCode,
}

impl RatePair {
    /// Build a pair, rejecting identical currencies.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequest::SameCurrency`] when `base == destination`.
    pub fn new(
        base: impl Into<CurrencyCode>,
        destination: impl Into<CurrencyCode>,
    ) -> Result<Self, InvalidRequest> {
        let base = base.into();
        let destination = destination.into();

        if base == destination {
            return Err(InvalidRequest::SameCurrency(base));
        }

        Ok(Self { base, destination })
    }

    /// Base currency code.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Destination currency code.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl fmt::Display for RatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.destination)
    }
}

/// A rate request that can never be answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    /// Base and destination are the same currency.
    #[error("base and destination are both {0}")]
    SameCurrency(CurrencyCode),

    /// The wire value does not name a known currency.
    #[error("unknown currency value {0}")]
    UnknownCurrency(i32),
}
