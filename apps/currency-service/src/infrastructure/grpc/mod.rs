//! gRPC Rate Server
//!
//! Implements the `CurrencyService` gRPC service: unary rate lookups and
//! bidirectional rate subscriptions.
//!
//! # Architecture
//!
//! Each `SubscribeRates` call gets its own session task which:
//!
//! 1. Registers the session with the `SubscriptionRegistry`
//! 2. Reads `RateRequest`s from the client and records valid pairs
//! 3. Pushes a `RateResponse` for every recorded pair on each update
//!    trigger (simulator tick or poll interval)
//! 4. Answers invalid requests in-band with a `RateError`
//! 5. Removes the session from the registry on disconnect
//!
//! Server reflection is served from [`descriptor::file_descriptor_set`].

pub mod convert;
pub mod descriptor;
pub mod server;
pub mod session;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod currency {
        pub mod v1 {
            include!("../../../../../packages/schema-gen/rust/currency/v1/currency.v1.rs");
        }
    }
}

pub use server::{CurrencyServer, CurrencyServerConfig};
pub use session::{SessionError, StreamSession};
