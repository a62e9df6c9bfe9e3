//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, rate table status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness check (simple OK)
//! - `GET /readyz` - Kubernetes readiness check (table loaded, simulator running)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::SimulatorStatus;
use crate::domain::rates::RateTable;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::broadcast::SharedRateUpdateHub;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Rate table status.
    pub rates: RatesInfo,
    /// Simulator status.
    pub simulator: SimulatorInfo,
    /// Active client count.
    pub clients: ClientStatus,
    /// Subscription statistics.
    pub subscriptions: SubscriptionStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Rates are served but no longer move.
    Degraded,
    /// No rates to serve.
    Unhealthy,
}

/// Rate table status.
#[derive(Debug, Clone, Serialize)]
pub struct RatesInfo {
    /// Whether the table holds any currency besides the reference.
    pub loaded: bool,
    /// Currencies in the table, reference included.
    pub currencies: usize,
    /// Time of the last table mutation.
    pub as_of: DateTime<Utc>,
}

/// Simulator status.
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorInfo {
    /// Whether the tick loop is active.
    pub running: bool,
    /// Ticks applied so far.
    pub ticks: u64,
    /// Time of the most recent tick.
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// Active client information.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    /// Total open subscription streams.
    pub total: i32,
}

/// Subscription statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Registered sessions.
    pub sessions: usize,
    /// Sessions holding at least one pair.
    pub streaming_sessions: usize,
    /// Distinct pairs across sessions.
    pub distinct_pairs: usize,
    /// Tick receivers on the broadcast channel.
    pub broadcast_receivers: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    table: Arc<RateTable>,
    simulator: Arc<SimulatorStatus>,
    registry: Arc<SubscriptionRegistry>,
    hub: SharedRateUpdateHub,
    clients: Arc<AtomicI32>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        table: Arc<RateTable>,
        simulator: Arc<SimulatorStatus>,
        registry: Arc<SubscriptionRegistry>,
        hub: SharedRateUpdateHub,
        clients: Arc<AtomicI32>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            table,
            simulator,
            registry,
            hub,
            clients,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = build_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by the health server.
pub fn build_router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);

    if response.rates.loaded && response.simulator.running {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let (currencies, as_of) = state.table.read(|s| (s.len(), s.as_of()));
    let rates = RatesInfo {
        loaded: currencies > 1,
        currencies,
        as_of,
    };

    let simulator = SimulatorInfo {
        running: state.simulator.is_running(),
        ticks: state.simulator.ticks(),
        last_tick_at: state.simulator.last_tick_at(),
    };

    let registry_stats = state.registry.stats();

    HealthResponse {
        status: determine_health_status(&rates, &simulator),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        rates,
        simulator,
        clients: ClientStatus {
            total: state.clients.load(Ordering::Relaxed),
        },
        subscriptions: SubscriptionStatus {
            sessions: registry_stats.session_count,
            streaming_sessions: registry_stats.streaming_sessions,
            distinct_pairs: registry_stats.pair_count,
            broadcast_receivers: state.hub.stats().tick_receivers,
        },
    }
}

const fn determine_health_status(rates: &RatesInfo, simulator: &SimulatorInfo) -> HealthStatus {
    match (rates.loaded, simulator.running) {
        (true, true) => HealthStatus::Healthy,
        (true, false) => HealthStatus::Degraded,
        (false, _) => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
