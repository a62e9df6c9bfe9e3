//! Broadcast Channel Adapter
//!
//! Fans simulator ticks out to every streaming session using a tokio
//! broadcast channel.
//!
//! # Architecture
//!
//! The simulator is the only sender. Each session task holds its own
//! receiver, so a slow session lags (and skips ticks) without slowing the
//! simulator or any other session.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::application::ports::TickPublisher;
use crate::domain::rates::RateTick;
use crate::infrastructure::metrics;

/// Default number of ticks buffered per receiver.
pub const DEFAULT_TICK_CAPACITY: usize = 64;

/// Central hub for rate update events.
///
/// # Example
///
/// ```rust
/// use currency_service::infrastructure::broadcast::RateUpdateHub;
///
/// let hub = RateUpdateHub::with_defaults();
/// let _rx = hub.subscribe();
/// assert_eq!(hub.receiver_count(), 1);
/// ```
#[derive(Debug)]
pub struct RateUpdateHub {
    ticks_tx: broadcast::Sender<RateTick>,
}

impl RateUpdateHub {
    /// Create a hub buffering up to `capacity` ticks per receiver.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ticks_tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Create a hub with [`DEFAULT_TICK_CAPACITY`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TICK_CAPACITY)
    }

    /// Send a tick to all subscribers.
    ///
    /// Returns the number of receivers that received the tick, or `None`
    /// if there are no active receivers.
    #[must_use]
    pub fn send_tick(&self, tick: RateTick) -> Option<usize> {
        self.ticks_tx.send(tick).ok()
    }

    /// Get a new receiver for ticks published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RateTick> {
        self.ticks_tx.subscribe()
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.ticks_tx.receiver_count()
    }

    /// Get statistics about the channel.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            tick_receivers: self.receiver_count(),
        }
    }
}

impl Default for RateUpdateHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TickPublisher for RateUpdateHub {
    fn publish(&self, tick: RateTick) -> Option<usize> {
        metrics::record_simulator_tick();
        self.send_tick(tick)
    }
}

/// Shared hub reference.
pub type SharedRateUpdateHub = Arc<RateUpdateHub>;

/// Statistics about the broadcast channel.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BroadcastStats {
    /// Number of tick receivers.
    pub tick_receivers: usize,
}

// =============================================================================
// Tests
// =============================================================================
