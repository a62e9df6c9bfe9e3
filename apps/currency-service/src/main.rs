//! Currency Rate Service Binary
//!
//! Loads the ECB reference rates, starts the rate simulator and serves the
//! `CurrencyService` gRPC API (with server reflection) alongside a health
//! endpoint.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin currency-service
//! ```
//!
//! # Environment Variables
//!
//! - `CURRENCY_RATES_URL`: Reference feed URL (default: ECB daily feed)
//! - `CURRENCY_FETCH_TIMEOUT_SECS`: Feed request timeout (default: 10)
//! - `CURRENCY_GRPC_PORT`: gRPC server port (default: 9092)
//! - `CURRENCY_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `CURRENCY_UPDATE_INTERVAL_MS`: Simulator tick interval (default: 5000)
//! - `CURRENCY_DELIVERY_MODE`: tick | poll (default: tick)
//! - `CURRENCY_POLL_INTERVAL_MS`: Per-session push interval in poll mode (default: 5000)
//! - `CURRENCY_TICK_CAPACITY`: Broadcast buffer per receiver (default: 64)
//! - `CURRENCY_SESSION_BUFFER`: Outbound messages buffered per stream (default: 256)
//! - `CURRENCY_SHUTDOWN_GRACE_SECS`: Time allowed for tasks to stop (default: 5)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: currency-service)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use currency_service::application::ports::{RateSource, TickPublisher};
use currency_service::application::services::{RandomDrift, RateQueryService, RateSimulator};
use currency_service::domain::subscription::SubscriptionRegistry;
use currency_service::infrastructure::broadcast::RateUpdateHub;
use currency_service::infrastructure::ecb::EcbRateFeed;
use currency_service::infrastructure::grpc::proto::currency::v1::currency_service_server::CurrencyServiceServer;
use currency_service::infrastructure::grpc::{CurrencyServer, CurrencyServerConfig, descriptor};
use currency_service::infrastructure::health::{HealthServer, HealthServerState};
use currency_service::infrastructure::telemetry;
use currency_service::{ServiceConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        trace_export = telemetry_guard.exporting(),
        "Starting Currency Rate Service"
    );

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics().context("installing Prometheus recorder")?;

    let config = ServiceConfig::from_env().context("loading configuration")?;
    log_config(&config);

    // The service cannot answer anything without reference rates
    let feed = EcbRateFeed::new(config.feed.url.clone(), config.feed.timeout)?;
    let table = Arc::new(
        feed.load()
            .await
            .with_context(|| format!("loading reference rates from {}", feed.url()))?,
    );

    let shutdown_token = CancellationToken::new();

    let hub = Arc::new(RateUpdateHub::new(config.streaming.tick_capacity));
    let registry = Arc::new(SubscriptionRegistry::new());
    let query = RateQueryService::new(Arc::clone(&table));

    // Start the rate simulator
    let publisher: Arc<dyn TickPublisher> = hub.clone();
    let simulator = RateSimulator::new(
        Arc::clone(&table),
        publisher,
        RandomDrift::new(),
        config.streaming.update_interval,
    );
    let simulator_status = simulator.status();
    let simulator_handle = tokio::spawn(simulator.run(shutdown_token.clone()));

    // Initialize gRPC server
    let grpc_server_config = CurrencyServerConfig {
        delivery_mode: config.streaming.delivery_mode,
        poll_interval: config.streaming.poll_interval,
        session_buffer: config.streaming.session_buffer,
    };
    let grpc_server = CurrencyServer::new(
        grpc_server_config,
        query,
        Arc::clone(&registry),
        Arc::clone(&hub),
    )
    .with_cancellation(shutdown_token.clone());

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&table),
        simulator_status,
        Arc::clone(&registry),
        Arc::clone(&hub),
        grpc_server.client_counter(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn gRPC server
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.server.grpc_port));
    let grpc_service = CurrencyServiceServer::new(grpc_server);
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(descriptor::file_descriptor_set())
        .build_v1()
        .context("building gRPC reflection service")?;
    let grpc_shutdown = shutdown_token.clone();

    let grpc_handle = tokio::spawn(async move {
        tracing::info!(addr = %grpc_addr, "gRPC server listening");
        if let Err(e) = Server::builder()
            .add_service(grpc_service)
            .add_service(reflection_service)
            .serve_with_shutdown(grpc_addr, grpc_shutdown.cancelled())
            .await
        {
            tracing::error!(error = %e, "gRPC server error");
        }
        tracing::info!("gRPC server stopped");
    });

    tracing::info!("Currency service ready");

    await_shutdown(shutdown_token, &config).await;

    let drained = tokio::time::timeout(config.shutdown_grace, async {
        let _ = tokio::join!(simulator_handle, health_handle, grpc_handle);
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            grace_secs = config.shutdown_grace.as_secs(),
            "Shutdown grace period elapsed with tasks still running"
        );
    }

    tracing::info!("Currency service stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        grpc_port = config.server.grpc_port,
        health_port = config.server.health_port,
        delivery_mode = config.streaming.delivery_mode.as_str(),
        update_interval = ?config.streaming.update_interval,
        "Configuration loaded"
    );
    tracing::debug!(
        rates_url = %config.feed.url,
        fetch_timeout = ?config.feed.timeout,
        poll_interval = ?config.streaming.poll_interval,
        tick_capacity = config.streaming.tick_capacity,
        session_buffer = config.streaming.session_buffer,
        "Streaming settings"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken, config: &ServiceConfig) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = config.shutdown_grace.as_secs(),
        "Graceful shutdown started"
    );
}
