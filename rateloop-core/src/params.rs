//! Control parameters shared by the producer, consumer and controller.
//!
//! Only the production delay changes after startup, and only the controller
//! changes it. The live value is kept next to the queue inside the flow
//! controller's critical section; this struct holds the startup values.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default consumer delay, in seconds.
pub const DEFAULT_CONSUMPTION_DELAY_SECS: u64 = 2;

/// Startup parameters for a simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlParameters {
    /// Initial production delay in seconds.
    pub production_delay_secs: f64,
    /// Fixed consumer delay in seconds.
    pub consumption_delay_secs: u64,
    /// Occupancy the controller tracks.
    pub threshold: usize,
    /// Queue capacity.
    pub capacity: usize,
}

impl ControlParameters {
    /// Creates parameters with the default capacity and consumption delay.
    #[must_use]
    pub const fn new(production_delay_secs: f64, threshold: usize) -> Self {
        Self {
            production_delay_secs,
            consumption_delay_secs: DEFAULT_CONSUMPTION_DELAY_SECS,
            threshold,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Returns a builder where required values start unset.
    #[must_use]
    pub const fn builder() -> ControlParametersBuilder {
        ControlParametersBuilder::new()
    }

    /// Sets the consumption delay.
    #[must_use]
    pub const fn with_consumption_delay_secs(mut self, secs: u64) -> Self {
        self.consumption_delay_secs = secs;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Creates parameters for testing: small queue, no consumer pause.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            production_delay_secs: 0.01,
            consumption_delay_secs: 0,
            threshold: 2,
            capacity: 4,
        }
    }

    /// Returns the consumer delay as a `Duration`.
    #[must_use]
    pub const fn consumption_delay(&self) -> Duration {
        Duration::from_secs(self.consumption_delay_secs)
    }

    /// Returns true when the threshold can never be reached.
    ///
    /// Such a configuration is accepted, but the controller will keep
    /// speeding up the producer forever.
    #[must_use]
    pub const fn threshold_exceeds_capacity(&self) -> bool {
        self.threshold > self.capacity
    }

    /// Checks the parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the production delay is not a
    /// positive finite number or the capacity is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.production_delay_secs.is_finite() || self.production_delay_secs <= 0.0 {
            return Err(ConfigError::invalid(
                "production_delay",
                format!(
                    "must be a positive number of seconds, got {}",
                    self.production_delay_secs
                ),
            ));
        }
        if self.capacity == 0 {
            return Err(ConfigError::invalid("capacity", "must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for [`ControlParameters`] that tracks required values.
#[derive(Debug, Clone, Default)]
pub struct ControlParametersBuilder {
    production_delay_secs: Option<f64>,
    threshold: Option<usize>,
    consumption_delay_secs: Option<u64>,
    capacity: Option<usize>,
}

impl ControlParametersBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            production_delay_secs: None,
            threshold: None,
            consumption_delay_secs: None,
            capacity: None,
        }
    }

    /// Sets the initial production delay (required).
    #[must_use]
    pub const fn production_delay_secs(mut self, secs: f64) -> Self {
        self.production_delay_secs = Some(secs);
        self
    }

    /// Sets the threshold (required).
    #[must_use]
    pub const fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Sets the consumption delay.
    #[must_use]
    pub const fn consumption_delay_secs(mut self, secs: u64) -> Self {
        self.consumption_delay_secs = Some(secs);
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Builds and validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if a required value was never set, or
    /// any error from [`ControlParameters::validate`].
    pub fn build(self) -> ConfigResult<ControlParameters> {
        let production_delay_secs = self.production_delay_secs.ok_or(ConfigError::Missing {
            name: "production_delay",
        })?;
        let threshold = self
            .threshold
            .ok_or(ConfigError::Missing { name: "threshold" })?;

        let params = ControlParameters {
            production_delay_secs,
            consumption_delay_secs: self
                .consumption_delay_secs
                .unwrap_or(DEFAULT_CONSUMPTION_DELAY_SECS),
            threshold,
            capacity: self.capacity.unwrap_or(DEFAULT_CAPACITY),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Converts seconds to a `Duration`, saturating instead of panicking.
///
/// Negative and NaN inputs become zero; values too large for a `Duration`
/// become `Duration::MAX`.
#[must_use]
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
