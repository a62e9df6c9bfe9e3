//! Domain Layer - Exchange rate state and subscription tracking.
//!
//! This layer holds the rate table and the per-session subscription
//! registry. Nothing here performs I/O; the types are shared by the
//! application services and the gRPC adapter.

/// Rate table, snapshots and currency pairs.
pub mod rates;

/// Per-session subscription tracking.
pub mod subscription;
