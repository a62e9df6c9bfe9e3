//! Concurrency-safe rate table and immutable snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{CurrencyCode, REFERENCE_CURRENCY, RateError, validate_rate};

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable copy of the table taken under a single lock acquisition.
///
/// Every push produced for one simulator tick is computed from the same
/// snapshot, so two pairs delivered for that tick are mutually consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    rates: HashMap<CurrencyCode, f64>,
    as_of: DateTime<Utc>,
}

impl RateSnapshot {
    /// Rate of `code` relative to the reference currency.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NotFound`] if the code is not in the snapshot.
    pub fn get(&self, code: &str) -> Result<f64, RateError> {
        self.rates
            .get(code)
            .copied()
            .ok_or_else(|| RateError::NotFound(code.to_string()))
    }

    /// Units of `destination` per one unit of `base`.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NotFound`] naming the first missing code,
    /// base checked before destination.
    pub fn cross_rate(&self, base: &str, destination: &str) -> Result<f64, RateError> {
        let base_rate = self.get(base)?;
        let destination_rate = self.get(destination)?;
        Ok(destination_rate / base_rate)
    }

    /// Time of the mutation this snapshot reflects.
    #[must_use]
    pub const fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// Whether `code` has an entry.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.rates.contains_key(code)
    }

    /// Number of currencies, reference included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// True when the snapshot holds no currencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Currency codes in alphabetical order.
    #[must_use]
    pub fn currencies(&self) -> Vec<CurrencyCode> {
        let mut codes: Vec<_> = self.rates.keys().cloned().collect();
        codes.sort_unstable();
        codes
    }

    /// Iterate over `(code, rate)` entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rates.iter().map(|(code, rate)| (code.as_str(), *rate))
    }
}

// =============================================================================
// Rate Table
// =============================================================================

/// Live rate table shared by the simulator, queries and stream sessions.
///
/// Single writer (the simulator), many readers. Locks are held only for the
/// duration of a map operation and never across an `.await`.
///
/// # Example
///
/// ```rust
/// use currency_service::domain::rates::RateTable;
///
/// let table = RateTable::from_rates([("USD".to_string(), 1.1), ("INR".to_string(), 90.0)])
///     .unwrap();
///
/// assert_eq!(table.get("EUR").unwrap(), 1.0);
/// let usd_inr = table.cross_rate("USD", "INR").unwrap();
/// assert!((usd_inr - 81.818).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct RateTable {
    state: RwLock<RateSnapshot>,
}

impl RateTable {
    /// Build a table from `(code, rate)` entries and insert the reference
    /// currency at 1.0.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidRate`] for the first entry that is not a
    /// positive finite number, or a reference entry other than 1.0.
    pub fn from_rates<I>(rates: I) -> Result<Self, RateError>
    where
        I: IntoIterator<Item = (CurrencyCode, f64)>,
    {
        let mut map = HashMap::new();
        for (code, rate) in rates {
            validate_rate(&code, rate)?;
            map.insert(code, rate);
        }
        map.insert(REFERENCE_CURRENCY.to_string(), 1.0);

        Ok(Self {
            state: RwLock::new(RateSnapshot {
                rates: map,
                as_of: Utc::now(),
            }),
        })
    }

    /// Rate of `code` relative to the reference currency.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NotFound`] if the code is not in the table.
    pub fn get(&self, code: &str) -> Result<f64, RateError> {
        self.state.read().get(code)
    }

    /// Replace (or add) a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidRate`] without touching the table when
    /// the value fails validation.
    pub fn set(&self, code: &str, rate: f64) -> Result<(), RateError> {
        validate_rate(code, rate)?;

        let mut state = self.state.write();
        state.rates.insert(code.to_string(), rate);
        state.as_of = Utc::now();
        Ok(())
    }

    /// Cross rate with both lookups under one read lock.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NotFound`] naming the missing code.
    pub fn cross_rate(&self, base: &str, destination: &str) -> Result<f64, RateError> {
        self.state.read().cross_rate(base, destination)
    }

    /// Run `f` against the current state without copying it.
    pub fn read<R>(&self, f: impl FnOnce(&RateSnapshot) -> R) -> R {
        f(&self.state.read())
    }

    /// Copy of the full table.
    #[must_use]
    pub fn snapshot(&self) -> RateSnapshot {
        self.state.read().clone()
    }

    /// Recompute every non-reference entry under one write lock.
    ///
    /// `f` receives each code with its current rate and returns the new
    /// rate. All new values are validated before any is written, so the
    /// table is either fully updated or left untouched.
    ///
    /// Returns a snapshot of the table after the update.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidRate`] for the first computed value that
    /// fails validation.
    pub fn update_all<F>(&self, mut f: F) -> Result<RateSnapshot, RateError>
    where
        F: FnMut(&str, f64) -> f64,
    {
        let mut state = self.state.write();

        let mut updates = Vec::with_capacity(state.rates.len());
        for (code, rate) in &state.rates {
            if code == REFERENCE_CURRENCY {
                continue;
            }
            let next = f(code, *rate);
            validate_rate(code, next)?;
            updates.push((code.clone(), next));
        }

        for (code, rate) in updates {
            state.rates.insert(code, rate);
        }
        state.as_of = Utc::now();

        Ok(state.clone())
    }

    /// Time of the last mutation.
    #[must_use]
    pub fn as_of(&self) -> DateTime<Utc> {
        self.state.read().as_of
    }

    /// Whether `code` has an entry.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.state.read().contains(code)
    }

    /// Number of currencies, reference included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// True when the table holds no currencies.
    ///
    /// Never true for a table built with [`RateTable::from_rates`], which
    /// always holds the reference currency.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
