//! Rate Query Service
//!
//! Read path for cross rates. Holds no state beyond a handle to the table.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::rates::{RateError, RatePair, RateSnapshot, RateTable};

/// A computed cross rate and the table time it was read at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateQuote {
    /// Units of destination per one unit of base.
    pub rate: f64,
    /// Time of the table mutation the rate reflects.
    pub as_of: DateTime<Utc>,
}

/// Computes `table[destination] / table[base]`.
#[derive(Debug, Clone)]
pub struct RateQueryService {
    table: Arc<RateTable>,
}

impl RateQueryService {
    /// Create a query service over a shared table.
    #[must_use]
    pub const fn new(table: Arc<RateTable>) -> Self {
        Self { table }
    }

    /// Cross rate between two codes from the live table.
    ///
    /// `get_rate(x, x)` is exactly 1.0 for any known `x`.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NotFound`] naming the missing currency.
    pub fn get_rate(&self, base: &str, destination: &str) -> Result<RateQuote, RateError> {
        self.table.read(|snapshot| quote_from(snapshot, base, destination))
    }

    /// Cross rate for a validated pair from the live table.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NotFound`] naming the missing currency.
    pub fn quote(&self, pair: &RatePair) -> Result<RateQuote, RateError> {
        self.get_rate(pair.base(), pair.destination())
    }

    /// Cross rate for a pair from a fixed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NotFound`] naming the missing currency.
    pub fn quote_at(snapshot: &RateSnapshot, pair: &RatePair) -> Result<RateQuote, RateError> {
        quote_from(snapshot, pair.base(), pair.destination())
    }

    /// The table this service reads.
    #[must_use]
    pub const fn table(&self) -> &Arc<RateTable> {
        &self.table
    }
}

fn quote_from(
    snapshot: &RateSnapshot,
    base: &str,
    destination: &str,
) -> Result<RateQuote, RateError> {
    Ok(RateQuote {
        rate: snapshot.cross_rate(base, destination)?,
        as_of: snapshot.as_of(),
    })
}
