#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Currency Rate Service
//!
//! A gRPC service that loads the ECB euro reference rates once at startup,
//! perturbs them on a fixed interval to simulate a live market, answers
//! unary cross-rate lookups and pushes updated rates to clients holding a
//! bidirectional subscription stream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core rate logic and data types
//!   - `rates`: Rate table, snapshots, pairs and tick events
//!   - `subscription`: Per-session subscription tracking
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the rate source and tick publishing
//!   - `services`: Rate queries and the rate simulator
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ecb`: HTTP loader and parser for the reference feed
//!   - `grpc`: gRPC server and per-stream session tasks
//!   - `broadcast`: Channel-based tick distribution
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! ECB feed ──(startup)──► RateTable ◄──(tick)── RateSimulator
//!                            │                        │
//!                         GetRate                RateUpdateHub
//!                            │                   │    │    │
//!                            ▼                   ▼    ▼    ▼
//!                         Client            Session tasks ──► Clients
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Rate state and subscription tracking.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::rates::{
    InvalidRequest, REFERENCE_CURRENCY, RateError, RatePair, RateSnapshot, RateTable, RateTick,
};
pub use domain::subscription::{
    AddOutcome, RegistryStats, SessionId, SessionState, SubscriptionRegistry,
};

// Application services and ports
pub use application::ports::{FetchError, RateSource, TickPublisher};
pub use application::services::{
    RandomDrift, RateQueryService, RateQuote, RateSimulator, ScriptedDrift, SimulatorStatus,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, DeliveryMode, FeedSettings, ServerSettings, ServiceConfig, StreamingSettings,
};

// Reference feed
pub use infrastructure::ecb::{EcbRateFeed, parse_reference_feed};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{BroadcastStats, RateUpdateHub, SharedRateUpdateHub};

// gRPC server (for integration tests)
pub use infrastructure::grpc::{
    proto::currency::v1 as proto,
    server::{CurrencyServer, CurrencyServerConfig},
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
