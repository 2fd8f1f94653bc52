//! Rateloop Tests - scenario and property tests across crates.
//!
//! Unit tests live in each crate under `#[cfg(test)]`. This crate exercises
//! the crates together:
//!
//! ## Test Organization
//!
//! **Integration Tests** (`*_tests.rs`):
//! - `flow_tests`: queue protocol with real roles, blocking scenarios and
//!   interleaving property tests
//! - `controller_tests`: feedback loop driven through the regulator, policy
//!   monotonicity properties
//! - `simulation_tests`: full simulations, sink failure isolation and
//!   cancellation
//!
//! **Support Modules**:
//! - `properties`: invariant checkers for queue and controller histories
//! - `scenarios`: reusable parameter sets and seeds
//! - `observers`: recording occupancy observer
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Property tests: `prop_<component>_<property>`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod observers;
pub mod properties;
pub mod scenarios;

#[cfg(test)]
mod simulation_tests;
