//! Failure-isolating front for a metrics sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::sink::{MetricsSink, NoopSink};

/// Wraps a sink so that failed writes are logged and counted, never
/// propagated.
///
/// Every role reports through one shared reporter.
pub struct MetricsReporter {
    sink: Arc<dyn MetricsSink>,
    recorded: AtomicU64,
    failures: AtomicU64,
}

impl MetricsReporter {
    /// Creates a reporter over `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            recorded: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Creates a reporter that discards every sample.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    /// Returns the wrapped sink's name.
    #[must_use]
    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Records one sample. Returns whether the sink accepted it.
    pub async fn report(&self, series: &str, value: f64) -> bool {
        match self.sink.record(series, value).await {
            Ok(()) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    sink = self.sink.name(),
                    series,
                    value,
                    failures,
                    error = %e,
                    "Failed to record metric"
                );
                false
            }
        }
    }

    /// Records an occupancy sample.
    pub async fn report_count(&self, series: &str, count: usize) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let value = count as f64;
        self.report(series, value).await
    }

    /// Returns statistics about the reporter.
    #[must_use]
    pub fn stats(&self) -> ReporterStats {
        ReporterStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("sink", &self.sink.name())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Counts of accepted and failed samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReporterStats {
    /// Samples the sink accepted.
    pub recorded: u64,
    /// Samples the sink failed to record.
    pub failures: u64,
}
