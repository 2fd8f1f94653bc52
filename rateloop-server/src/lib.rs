//! Rateloop server - command-line driver for the feedback simulation.
//!
//! Parses the startup flags, selects a metrics sink and renders a queue
//! gauge on stdout after every removal.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod gauge;

pub use cli::{Args, PolicyKind, SinkKind};
pub use gauge::{render_gauge, QueueGauge};
