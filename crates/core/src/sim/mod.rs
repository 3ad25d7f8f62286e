//! Deterministic in-memory chain for tests and dry runs.
//!
//! [`SimWorld`] implements every in-unit service on one token ledger;
//! [`SimChain`] serves the async reads from the same shared state.

mod chain;
pub mod scenario;
mod world;

pub use chain::SimChain;
pub use world::{CallCounters, Faults, ReserveConfig, SimWorld};
