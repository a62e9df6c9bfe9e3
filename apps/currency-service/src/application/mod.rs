//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the rate query and simulation services and the port
//! interfaces through which they reach the reference feed and the update
//! fan-out.

/// Port interfaces for the reference feed and tick publication.
pub mod ports;

/// Rate queries and the rate simulator.
pub mod services;
