//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Queries**: Unary rate lookups by outcome
//! - **Pushes**: Streamed rate responses and push failures by reason
//! - **Sessions**: Active streaming clients
//! - **Simulator**: Completed ticks
//! - **Feed**: Reference feed load duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "currency_rate_queries_total",
        "Total unary GetRate calls by outcome"
    );
    describe_counter!(
        "currency_pushes_sent_total",
        "Total rate responses pushed to streaming clients"
    );
    describe_counter!(
        "currency_push_failures_total",
        "Total failed pushes by reason"
    );

    describe_gauge!(
        "currency_active_sessions",
        "Number of open SubscribeRates streams"
    );

    describe_counter!(
        "currency_simulator_ticks_total",
        "Total simulator ticks applied to the rate table"
    );

    describe_histogram!(
        "currency_feed_load_seconds",
        "Time to fetch and parse the reference feed"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for unary rate queries.
#[derive(Debug, Clone, Copy)]
pub enum QueryOutcome {
    /// Rate computed.
    Ok,
    /// Same or unknown currency.
    InvalidArgument,
    /// A code is missing from the table.
    NotFound,
}

impl QueryOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
        }
    }
}

/// Reason label for failed pushes.
#[derive(Debug, Clone, Copy)]
pub enum PushFailure {
    /// A subscribed rate could not be computed.
    Compute,
    /// The session missed ticks because it fell behind.
    Lagged,
    /// The outbound channel was closed by the client side.
    Disconnected,
}

impl PushFailure {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Lagged => "lagged",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Record a unary rate query.
pub fn record_rate_query(outcome: QueryOutcome) {
    counter!(
        "currency_rate_queries_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record rate responses pushed to a streaming client.
pub fn record_pushes_sent(count: u64) {
    counter!("currency_pushes_sent_total").increment(count);
}

/// Record push failures.
pub fn record_push_failure(reason: PushFailure, count: u64) {
    counter!(
        "currency_push_failures_total",
        "reason" => reason.as_str()
    )
    .increment(count);
}

/// Update the active session count.
pub fn set_active_sessions(count: f64) {
    gauge!("currency_active_sessions").set(count);
}

/// Record a completed simulator tick.
pub fn record_simulator_tick() {
    counter!("currency_simulator_ticks_total").increment(1);
}

/// Record how long the reference feed took to load.
pub fn record_feed_load_duration(duration: Duration, success: bool) {
    histogram!(
        "currency_feed_load_seconds",
        "result" => if success { "ok" } else { "error" }
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_outcome_as_str() {
        assert_eq!(QueryOutcome::Ok.as_str(), "ok");
        assert_eq!(QueryOutcome::InvalidArgument.as_str(), "invalid_argument");
        assert_eq!(QueryOutcome::NotFound.as_str(), "not_found");
    }

    #[test]
    fn push_failure_as_str() {
        assert_eq!(PushFailure::Compute.as_str(), "compute");
        assert_eq!(PushFailure::Lagged.as_str(), "lagged");
        assert_eq!(PushFailure::Disconnected.as_str(), "disconnected");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_rate_query(QueryOutcome::Ok);
        record_pushes_sent(3);
        record_push_failure(PushFailure::Lagged, 2);
        set_active_sessions(1.0);
        record_simulator_tick();
        record_feed_load_duration(Duration::from_millis(12), true);
    }
}
