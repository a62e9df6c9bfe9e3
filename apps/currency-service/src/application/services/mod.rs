//! Application Services
//!
//! - `RateQueryService`: stateless cross-rate lookups
//! - `RateSimulator`: periodic bounded perturbation of the rate table

mod query;
mod simulator;

pub use query::{RateQuote, RateQueryService};
pub use simulator::{
    DriftSource, MAX_DRIFT_PERCENT, RandomDrift, RateSimulator, ScriptedDrift, SimulatorStatus,
    apply_drift,
};
