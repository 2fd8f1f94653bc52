//! In-memory sink with fault injection for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{SinkError, SinkResult};
use crate::sink::MetricsSink;

/// One recorded sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Series the sample was written to.
    pub series: String,
    /// Sample value.
    pub value: f64,
}

/// Fault injection settings for [`SimulatedSink`].
#[derive(Debug, Clone, Default)]
pub struct SinkFaultConfig {
    /// Probability of a record failing. Range: 0.0 - 1.0.
    pub fail_rate: f64,
    /// If true, every record fails.
    pub always_fail: bool,
    /// If true, the next record fails (one-shot).
    pub force_fail: bool,
}

impl SinkFaultConfig {
    /// No faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Every record fails.
    #[must_use]
    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Sets the failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.fail_rate = rate;
        self
    }

    /// Forces the next record to fail (one-shot).
    #[must_use]
    pub const fn with_force_fail(mut self) -> Self {
        self.force_fail = true;
        self
    }
}

/// Sink that keeps every accepted sample in memory.
///
/// Fault decisions are derived from the seed and an operation counter, so a
/// given seed fails the same operations on every run. Clones share storage.
#[derive(Debug, Clone)]
pub struct SimulatedSink {
    samples: Arc<Mutex<Vec<Sample>>>,
    fault_config: Arc<Mutex<SinkFaultConfig>>,
    seed: u64,
    counter: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl SimulatedSink {
    /// Creates a sink with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, SinkFaultConfig::none())
    }

    /// Creates a sink with fault injection enabled.
    #[must_use]
    pub fn with_faults(seed: u64, config: SinkFaultConfig) -> Self {
        Self {
            samples: Arc::new(Mutex::new(Vec::new())),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the fault configuration for modification.
    pub fn fault_config(&self) -> MutexGuard<'_, SinkFaultConfig> {
        self.fault_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of every accepted sample, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<Sample> {
        self.lock_samples().clone()
    }

    /// Returns the values accepted on one series, oldest first.
    #[must_use]
    pub fn values(&self, series: &str) -> Vec<f64> {
        self.lock_samples()
            .iter()
            .filter(|s| s.series == series)
            .map(|s| s.value)
            .collect()
    }

    /// Returns the number of accepted samples.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.lock_samples().len()
    }

    /// Returns the number of injected failures.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Drops all recorded samples.
    pub fn clear(&self) {
        self.lock_samples().clear();
    }

    fn lock_samples(&self) -> MutexGuard<'_, Vec<Sample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x5851_f42d_4c95_7f2d);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }
}

#[async_trait]
impl MetricsSink for SimulatedSink {
    async fn record(&self, series: &str, value: f64) -> SinkResult<()> {
        let fail = {
            let mut config = self.fault_config();
            let forced = config.force_fail;
            config.force_fail = false;
            forced || config.always_fail || self.should_inject_fault(config.fail_rate)
        };
        if fail {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(SinkError::Injected {
                series: series.to_string(),
            });
        }

        self.lock_samples().push(Sample {
            series: series.to_string(),
            value,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
