//! Rateloop Runtime - the concurrent roles of the simulation.
//!
//! Three tokio tasks share one [`FlowController`](rateloop_flow::FlowController):
//!
//! - [`Producer`]: inserts a fresh message, then sleeps the production delay
//! - [`Consumer`]: removes the front message, then sleeps the fixed
//!   consumption delay
//! - [`Regulator`]: once per period, rewrites the production delay so that
//!   occupancy tracks the threshold
//!
//! Every suspension point races a shared `CancellationToken`, so a cancelled
//! role exits promptly wherever it is blocked and releases what it holds.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use rateloop_core::ControlParameters;
//! use rateloop_flow::FeedbackConfig;
//! use rateloop_runtime::Simulation;
//! use rateloop_sink::LogSink;
//!
//! let params = ControlParameters::new(2.0, 5).with_capacity(10);
//! let sim = Simulation::new(params, FeedbackConfig::default(), Arc::new(LogSink))?;
//! let handle = sim.spawn();
//! tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//! let report = handle.shutdown().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod consumer;
mod error;
mod observer;
mod producer;
mod regulator;
mod role;
mod simulation;

pub use consumer::{Consumer, ConsumerStats};
pub use error::{RuntimeError, RuntimeResult};
pub use observer::{NoopObserver, OccupancyObserver};
pub use producer::{Produced, Producer, ProducerStats};
pub use regulator::Regulator;
pub use role::Role;
pub use simulation::{Simulation, SimulationHandle, SimulationReport, DEFAULT_SHUTDOWN_TIMEOUT};
