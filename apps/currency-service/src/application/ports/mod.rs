//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `RateSource`: one-shot loader for the reference rate table
//! - `TickPublisher`: fan-out of simulator ticks to stream sessions

use async_trait::async_trait;

use crate::domain::rates::{RateError, RateTable, RateTick};

/// Failure to load the reference rate table. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Feed URL.
        url: String,
        /// Underlying client error.
        message: String,
    },

    /// The feed answered with a non-success status.
    #[error("reference feed returned HTTP {0}")]
    Status(u16),

    /// The document could not be parsed.
    #[error("malformed reference feed: {0}")]
    Malformed(String),

    /// A rate attribute is not a number.
    #[error("rate {value:?} for {currency} is not a number")]
    InvalidRate {
        /// Currency the attribute belongs to.
        currency: String,
        /// Raw attribute text.
        value: String,
    },

    /// A parsed rate was rejected by the table.
    #[error(transparent)]
    Rejected(#[from] RateError),

    /// The document parsed but listed no currencies.
    #[error("reference feed contained no rates")]
    EmptyFeed,
}

/// Loads the reference rate table.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetch and parse the feed into a fresh table.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing the first failure encountered.
    async fn load(&self) -> Result<RateTable, FetchError>;
}

/// Publishes simulator ticks.
#[cfg_attr(test, mockall::automock)]
pub trait TickPublisher: Send + Sync {
    /// Deliver a tick to every current listener without blocking.
    ///
    /// Returns the number of listeners reached, or `None` when there are no
    /// listeners and the tick was dropped.
    fn publish(&self, tick: RateTick) -> Option<usize>;
}
