//! Table mutation events.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::RateSnapshot;

/// Published once per simulator tick, after every entry has been updated.
#[derive(Debug, Clone)]
pub struct RateTick {
    /// Monotonically increasing, starting at 1.
    pub sequence: u64,
    /// Table state produced by this tick.
    pub snapshot: Arc<RateSnapshot>,
}

impl RateTick {
    /// Time of the mutation.
    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        self.snapshot.as_of()
    }
}
