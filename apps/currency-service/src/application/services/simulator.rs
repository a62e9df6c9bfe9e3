//! Rate Simulator
//!
//! Background task that perturbs every non-reference rate by a bounded
//! random percentage on a fixed interval, then publishes one [`RateTick`]
//! carrying the resulting snapshot.
//!
//! # Drift
//!
//! For each currency an integer `p` is drawn from `[0, 20]` and mapped to
//! `delta = p - 10`. An independent random bit picks the direction, and the
//! entry becomes `rate * (100 ± delta) / 100`. Every entry therefore moves
//! by at most 10% per tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::TickPublisher;
use crate::domain::rates::{RateError, RateTable, RateTick};

/// Largest absolute percentage change applied in one tick.
pub const MAX_DRIFT_PERCENT: i32 = 10;

// =============================================================================
// Drift Sources
// =============================================================================

/// Supplies the signed percentage change for each currency on a tick.
pub trait DriftSource: Send {
    /// Percentage change in `[-MAX_DRIFT_PERCENT, MAX_DRIFT_PERCENT]`.
    fn next_drift(&mut self, code: &str) -> i32;
}

/// Uniform random drift.
#[derive(Debug)]
pub struct RandomDrift {
    rng: StdRng,
}

impl RandomDrift {
    /// Seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic sequence for a given seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDrift {
    fn default() -> Self {
        Self::new()
    }
}

impl DriftSource for RandomDrift {
    fn next_drift(&mut self, _code: &str) -> i32 {
        let percent: i32 = self.rng.random_range(0..=2 * MAX_DRIFT_PERCENT);
        let delta = percent - MAX_DRIFT_PERCENT;
        if self.rng.random_bool(0.5) {
            delta
        } else {
            -delta
        }
    }
}

/// Fixed per-currency drift, applied identically on every tick.
///
/// Currencies without an entry do not move. Values are clamped to the
/// drift bound.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDrift {
    drifts: HashMap<String, i32>,
}

impl ScriptedDrift {
    /// Build from `(code, percent)` entries.
    pub fn new<I, S>(drifts: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        Self {
            drifts: drifts
                .into_iter()
                .map(|(code, percent)| {
                    (
                        code.into(),
                        percent.clamp(-MAX_DRIFT_PERCENT, MAX_DRIFT_PERCENT),
                    )
                })
                .collect(),
        }
    }
}

impl DriftSource for ScriptedDrift {
    fn next_drift(&mut self, code: &str) -> i32 {
        self.drifts.get(code).copied().unwrap_or(0)
    }
}

/// Apply a percentage change to a rate.
#[must_use]
pub fn apply_drift(rate: f64, percent: i32) -> f64 {
    rate * f64::from(100 + percent) / 100.0
}

// =============================================================================
// Status
// =============================================================================

/// Progress counters shared with health reporting.
#[derive(Debug, Default)]
pub struct SimulatorStatus {
    running: AtomicBool,
    ticks: AtomicU64,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
}

impl SimulatorStatus {
    /// Create idle status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the run loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Time of the most recent tick.
    #[must_use]
    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        *self.last_tick_at.read()
    }

    /// Mark the run loop active or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn record_tick(&self, at: DateTime<Utc>) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.write() = Some(at);
    }
}

// =============================================================================
// Simulator
// =============================================================================

/// Periodically mutates the rate table and publishes ticks.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use currency_service::application::services::{RandomDrift, RateSimulator};
/// use currency_service::domain::rates::RateTable;
/// use currency_service::infrastructure::broadcast::RateUpdateHub;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example(table: Arc<RateTable>) {
///     let hub = Arc::new(RateUpdateHub::with_defaults());
///     let cancel = CancellationToken::new();
///
///     let simulator = RateSimulator::new(
///         table,
///         hub.clone(),
///         RandomDrift::new(),
///         Duration::from_secs(5),
///     );
///
///     let mut ticks = hub.subscribe();
///     tokio::spawn(simulator.run(cancel.clone()));
///
///     if let Ok(tick) = ticks.recv().await {
///         println!("tick {} at {}", tick.sequence, tick.at());
///     }
///     cancel.cancel();
/// }
/// ```
pub struct RateSimulator {
    table: Arc<RateTable>,
    publisher: Arc<dyn TickPublisher>,
    drift: Box<dyn DriftSource>,
    interval: Duration,
    status: Arc<SimulatorStatus>,
    sequence: u64,
}

impl RateSimulator {
    /// Create a simulator. Nothing happens until [`RateSimulator::run`] or
    /// [`RateSimulator::tick`] is called.
    #[must_use]
    pub fn new(
        table: Arc<RateTable>,
        publisher: Arc<dyn TickPublisher>,
        drift: impl DriftSource + 'static,
        interval: Duration,
    ) -> Self {
        Self {
            table,
            publisher,
            drift: Box::new(drift),
            interval,
            status: Arc::new(SimulatorStatus::new()),
            sequence: 0,
        }
    }

    /// Shared status handle.
    #[must_use]
    pub fn status(&self) -> Arc<SimulatorStatus> {
        Arc::clone(&self.status)
    }

    /// Perform one tick: update every entry under one write lock, then
    /// publish the resulting snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidRate`] if a computed rate is rejected; the
    /// table is left unchanged and nothing is published.
    pub fn tick(&mut self) -> Result<RateTick, RateError> {
        let drift = &mut self.drift;
        let snapshot = self
            .table
            .update_all(|code, rate| apply_drift(rate, drift.next_drift(code)))?;

        self.sequence += 1;
        let tick = RateTick {
            sequence: self.sequence,
            snapshot: Arc::new(snapshot),
        };
        self.status.record_tick(tick.at());

        match self.publisher.publish(tick.clone()) {
            Some(receivers) => {
                tracing::debug!(sequence = tick.sequence, receivers, "Rate tick published");
            }
            None => {
                tracing::trace!(sequence = tick.sequence, "Rate tick dropped, no listeners");
            }
        }

        Ok(tick)
    }

    /// Run the tick loop until cancelled.
    ///
    /// The first tick fires one full interval after start.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.status.set_running(true);
        tracing::info!(
            interval = ?self.interval,
            currencies = self.table.len(),
            "Rate simulator started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Rate simulator cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        tracing::error!(error = %e, "Rate tick rejected");
                    }
                }
            }
        }

        self.status.set_running(false);
        tracing::info!(ticks = self.status.ticks(), "Rate simulator stopped");
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::*;
    use crate::application::ports::MockTickPublisher;

    #[derive(Default)]
    struct RecordingPublisher {
        ticks: Mutex<Vec<RateTick>>,
    }

    impl TickPublisher for RecordingPublisher {
        fn publish(&self, tick: RateTick) -> Option<usize> {
            self.ticks.lock().push(tick);
            Some(1)
        }
    }

    struct SilentPublisher;

    impl TickPublisher for SilentPublisher {
        fn publish(&self, _tick: RateTick) -> Option<usize> {
            None
        }
    }

    fn scenario_table() -> Arc<RateTable> {
        Arc::new(
            RateTable::from_rates([("USD".to_string(), 1.1), ("INR".to_string(), 90.0)]).unwrap(),
        )
    }

    #[test]
    fn scripted_tick_matches_scenario() {
        let table = scenario_table();
        let publisher = Arc::new(RecordingPublisher::default());
        let mut simulator = RateSimulator::new(
            Arc::clone(&table),
            publisher.clone(),
            ScriptedDrift::new([("USD", 5), ("INR", -3)]),
            Duration::from_secs(5),
        );

        let tick = simulator.tick().unwrap();

        assert_eq!(tick.sequence, 1);
        assert_eq!(table.get("EUR").unwrap(), 1.0);
        assert!((table.get("USD").unwrap() - 1.155).abs() < 1e-9);
        assert!((table.get("INR").unwrap() - 87.3).abs() < 1e-9);

        let usd_inr = tick.snapshot.cross_rate("USD", "INR").unwrap();
        assert!((usd_inr - 75.584).abs() < 0.001);
        assert_eq!(publisher.ticks.lock().len(), 1);
    }

    #[test]
    fn reference_never_moves() {
        let table = scenario_table();
        let mut publisher = MockTickPublisher::new();
        publisher
            .expect_publish()
            .withf(|tick| tick.snapshot.get("EUR") == Ok(1.0))
            .times(5)
            .returning(|_| None);

        let mut simulator = RateSimulator::new(
            Arc::clone(&table),
            Arc::new(publisher),
            ScriptedDrift::new([("EUR", 10), ("USD", 10)]),
            Duration::from_secs(5),
        );

        for _ in 0..5 {
            simulator.tick().unwrap();
        }

        assert_eq!(table.get("EUR").unwrap(), 1.0);
    }

    #[test]
    fn random_tick_stays_within_bound() {
        let table = scenario_table();
        let before = table.snapshot();
        let mut simulator = RateSimulator::new(
            Arc::clone(&table),
            Arc::new(SilentPublisher),
            RandomDrift::seeded(7),
            Duration::from_secs(5),
        );

        let tick = simulator.tick().unwrap();

        assert_eq!(tick.snapshot.len(), before.len());
        for (code, old) in before.iter() {
            let new = tick.snapshot.get(code).unwrap();
            assert!((new / old - 1.0).abs() <= 0.1 + 1e-12, "{code} moved too far");
        }
    }

    #[test]
    fn sequence_increments_and_status_tracks() {
        let mut simulator = RateSimulator::new(
            scenario_table(),
            Arc::new(SilentPublisher),
            RandomDrift::seeded(1),
            Duration::from_secs(5),
        );
        let status = simulator.status();

        let first = simulator.tick().unwrap();
        let second = simulator.tick().unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(status.ticks(), 2);
        assert_eq!(status.last_tick_at(), Some(second.at()));
    }

    #[test]
    fn scripted_drift_clamped() {
        let mut drift = ScriptedDrift::new([("USD", 50), ("GBP", -50)]);
        assert_eq!(drift.next_drift("USD"), 10);
        assert_eq!(drift.next_drift("GBP"), -10);
        assert_eq!(drift.next_drift("JPY"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_on_interval() {
        let publisher = Arc::new(RecordingPublisher::default());
        let simulator = RateSimulator::new(
            scenario_table(),
            publisher.clone(),
            RandomDrift::seeded(3),
            Duration::from_millis(100),
        );
        let status = simulator.status();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(simulator.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(status.is_running());

        cancel.cancel();
        handle.await.unwrap();

        assert!(!status.is_running());
        let sequences: Vec<_> = publisher.ticks.lock().iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let simulator = RateSimulator::new(
            scenario_table(),
            Arc::new(SilentPublisher),
            RandomDrift::new(),
            Duration::from_secs(10),
        );
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(simulator.run(cancel.clone()));
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "simulator should shut down on cancellation");
    }

    proptest! {
        #[test]
        fn random_drift_within_bound(seed in any::<u64>()) {
            let mut drift = RandomDrift::seeded(seed);
            for _ in 0..64 {
                let percent = drift.next_drift("USD");
                prop_assert!((-MAX_DRIFT_PERCENT..=MAX_DRIFT_PERCENT).contains(&percent));
            }
        }

        #[test]
        fn applied_drift_within_ten_percent(rate in 1e-6f64..1e6, percent in -10i32..=10) {
            let next = apply_drift(rate, percent);
            prop_assert!(next > 0.0);
            prop_assert!((next / rate - 1.0).abs() <= 0.1 + 1e-12);
        }
    }
}
