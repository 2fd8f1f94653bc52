//! Rateloop Sink - metrics backends for queue occupancy and delay.
//!
//! Producer and consumer emit occupancy to the `metrics` series after every
//! insert and removal; the controller emits the production delay to
//! `delay_metrics` once per tick. Both go through a [`MetricsSink`].
//!
//! # Backends
//!
//! - [`NoopSink`]: discards samples
//! - [`LogSink`]: one `tracing` debug event per sample
//! - [`SimulatedSink`]: in-memory with fault injection, for tests
//! - [`RedisTimeSeriesSink`]: `TS.ADD` over RESP to a Redis TimeSeries server
//! - [`PostgresSink`]: one parameterized insert per sample into a table per
//!   series
//!
//! Roles never call a sink directly. [`MetricsReporter`] absorbs failures so
//! an unreachable backend cannot stall or crash the simulation.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod backoff;
mod error;
mod postgres;
mod redis;
mod reporter;
mod simulated;
mod sink;

pub use error::{SinkError, SinkResult};
pub use postgres::{insert_statement, redact_url, PostgresConfig, PostgresSink};
pub use redis::{decode_reply, encode_ts_add, RedisConfig, RedisTimeSeriesSink, Reply};
pub use reporter::{MetricsReporter, ReporterStats};
pub use simulated::{Sample, SimulatedSink, SinkFaultConfig};
pub use sink::{LogSink, MetricsSink, NoopSink, DELAY_SERIES, OCCUPANCY_SERIES};
