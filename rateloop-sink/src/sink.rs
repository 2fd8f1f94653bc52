//! The metrics sink trait and trivial backends.

use async_trait::async_trait;
use tracing::debug;

use crate::error::SinkResult;

/// Series receiving queue occupancy after every insert and removal.
pub const OCCUPANCY_SERIES: &str = "metrics";

/// Series receiving the production delay after every controller tick.
pub const DELAY_SERIES: &str = "delay_metrics";

/// A write-only time-series backend.
///
/// Each sample is timestamped by the backend at the moment it is recorded.
/// Implementations must be `Send + Sync`; one sink is shared by every role.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Records one sample on `series`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not accept the sample.
    async fn record(&self, series: &str, value: f64) -> SinkResult<()>;

    /// Returns a short backend name for logging.
    fn name(&self) -> &'static str;
}

/// Discards every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl MetricsSink for NoopSink {
    async fn record(&self, _series: &str, _value: f64) -> SinkResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Emits every sample as a `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl MetricsSink for LogSink {
    async fn record(&self, series: &str, value: f64) -> SinkResult<()> {
        debug!(series, value, "Metric sample");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_trivial_sinks_accept_everything() {
        let sinks: Vec<Arc<dyn MetricsSink>> = vec![Arc::new(NoopSink), Arc::new(LogSink)];
        for sink in sinks {
            sink.record(OCCUPANCY_SERIES, 3.0).await.unwrap();
            sink.record(DELAY_SERIES, f64::MAX).await.unwrap();
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(NoopSink.name(), "none");
        assert_eq!(LogSink.name(), "log");
    }
}
