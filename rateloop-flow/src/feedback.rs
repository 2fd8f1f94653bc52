//! Occupancy feedback controller for the production delay.
//!
//! Once per period the controller compares queue occupancy with a target
//! threshold and rewrites the producer's delay:
//!
//! 1. **Below threshold**: shorten the delay (speed the producer up) using a
//!    [`DelayPolicy`]. Decreases are monotonic and never go under `floor_secs`.
//! 2. **Above threshold**: lengthen the delay by a fixed increment. There is
//!    no ceiling; sustained overload grows the delay without bound.
//! 3. **At threshold**: leave the delay alone.
//!
//! The controller itself is pure: it takes an occupancy and a delay and
//! returns the new delay. The async loop that samples the queue lives in
//! `rateloop-runtime`.

use std::time::Duration;

use crate::controller::SharedState;
use crate::error::{FlowError, FlowResult};

/// How the delay shrinks when occupancy is below threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayPolicy {
    /// Multiply the delay by `factor`.
    Damping {
        /// Multiplier in `(0, 1)`.
        factor: f64,
    },
    /// Subtract `step_secs` while the delay exceeds it, then multiply by
    /// `gentle_factor`.
    Stepped {
        /// Amount subtracted per tick, in seconds.
        step_secs: f64,
        /// Multiplier in `(0, 1)` once the delay is at or under one step.
        gentle_factor: f64,
    },
}

impl DelayPolicy {
    /// Default damping multiplier.
    pub const DEFAULT_DAMPING_FACTOR: f64 = 0.7;

    /// Default step for the stepped policy, in seconds.
    pub const DEFAULT_STEP_SECS: f64 = 1.0;

    /// Default multiplier for the stepped policy's small-delay regime.
    pub const DEFAULT_GENTLE_FACTOR: f64 = 0.9;

    /// Damping with the default factor.
    #[must_use]
    pub const fn damping() -> Self {
        Self::Damping {
            factor: Self::DEFAULT_DAMPING_FACTOR,
        }
    }

    /// Stepped decrease with the default step and factor.
    #[must_use]
    pub const fn stepped() -> Self {
        Self::Stepped {
            step_secs: Self::DEFAULT_STEP_SECS,
            gentle_factor: Self::DEFAULT_GENTLE_FACTOR,
        }
    }

    /// Returns a short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Damping { .. } => "damping",
            Self::Stepped { .. } => "stepped",
        }
    }

    /// Applies one decrease step, before flooring.
    #[must_use]
    pub fn decrease(&self, delay_secs: f64) -> f64 {
        match *self {
            Self::Damping { factor } => delay_secs * factor,
            Self::Stepped {
                step_secs,
                gentle_factor,
            } => {
                if delay_secs > step_secs {
                    delay_secs - step_secs
                } else {
                    delay_secs * gentle_factor
                }
            }
        }
    }

    fn validate(&self) -> FlowResult<()> {
        let (factor, step) = match *self {
            Self::Damping { factor } => (factor, None),
            Self::Stepped {
                step_secs,
                gentle_factor,
            } => (gentle_factor, Some(step_secs)),
        };
        if !(factor > 0.0 && factor < 1.0) {
            return Err(FlowError::InvalidConfig {
                message: format!("{} factor must be in (0, 1), got {factor}", self.name()),
            });
        }
        if let Some(step) = step {
            if !(step.is_finite() && step > 0.0) {
                return Err(FlowError::InvalidConfig {
                    message: format!("stepped policy step must be positive, got {step}"),
                });
            }
        }
        Ok(())
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::damping()
    }
}

/// Configuration for the feedback controller.
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Target occupancy.
    pub threshold: usize,

    /// How the delay shrinks below threshold.
    pub policy: DelayPolicy,

    /// Seconds added per tick above threshold.
    pub increase_secs: f64,

    /// Smallest delay a decrease may produce, in seconds.
    pub floor_secs: f64,

    /// Time between ticks.
    pub period: Duration,
}

impl FeedbackConfig {
    /// Default increment above threshold, in seconds.
    pub const DEFAULT_INCREASE_SECS: f64 = 1.0;

    /// Default floor for decreases, in seconds.
    pub const DEFAULT_FLOOR_SECS: f64 = 0.001;

    /// Default tick period.
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

    /// Creates a configuration with the default policy and timing.
    #[must_use]
    pub const fn new(threshold: usize) -> Self {
        Self {
            threshold,
            policy: DelayPolicy::damping(),
            increase_secs: Self::DEFAULT_INCREASE_SECS,
            floor_secs: Self::DEFAULT_FLOOR_SECS,
            period: Self::DEFAULT_PERIOD,
        }
    }

    /// Sets the decrease policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DelayPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the increment above threshold.
    #[must_use]
    pub const fn with_increase_secs(mut self, secs: f64) -> Self {
        self.increase_secs = secs;
        self
    }

    /// Sets the decrease floor.
    #[must_use]
    pub const fn with_floor_secs(mut self, secs: f64) -> Self {
        self.floor_secs = secs;
        self
    }

    /// Sets the tick period.
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            threshold: 2,
            policy: DelayPolicy::damping(),
            increase_secs: Self::DEFAULT_INCREASE_SECS,
            floor_secs: Self::DEFAULT_FLOOR_SECS,
            period: Duration::from_millis(100), // 100ms for faster tests.
        }
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` for a policy factor outside
    /// `(0, 1)`, a non-positive step, increment or floor, or a zero period.
    pub fn validate(&self) -> FlowResult<()> {
        self.policy.validate()?;
        if !(self.increase_secs.is_finite() && self.increase_secs > 0.0) {
            return Err(FlowError::InvalidConfig {
                message: format!("increase must be positive, got {}", self.increase_secs),
            });
        }
        if !(self.floor_secs.is_finite() && self.floor_secs > 0.0) {
            return Err(FlowError::InvalidConfig {
                message: format!("floor must be positive, got {}", self.floor_secs),
            });
        }
        if self.period.is_zero() {
            return Err(FlowError::InvalidConfig {
                message: "period must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Direction of a single adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Occupancy below threshold; delay shortened (or already at the floor).
    SpeedUp,
    /// Occupancy above threshold; delay lengthened.
    SlowDown,
    /// Occupancy at threshold; delay unchanged.
    Hold,
}

/// Outcome of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayUpdate {
    /// Occupancy the decision was based on.
    pub occupancy: usize,
    /// Delay before the tick.
    pub previous_secs: f64,
    /// Delay after the tick.
    pub current_secs: f64,
    /// Direction taken.
    pub adjustment: Adjustment,
}

/// Feedback controller for the production delay.
#[derive(Debug)]
pub struct FeedbackController {
    /// Configuration.
    config: FeedbackConfig,

    /// Total ticks that shortened the delay.
    total_speedups: u64,

    /// Total ticks that lengthened the delay.
    total_slowdowns: u64,

    /// Total ticks at threshold.
    total_holds: u64,
}

impl FeedbackController {
    /// Creates a feedback controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: FeedbackConfig) -> FlowResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            total_speedups: 0,
            total_slowdowns: 0,
            total_holds: 0,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Returns the direction the controller would take at `occupancy`.
    #[must_use]
    pub const fn decide(&self, occupancy: usize) -> Adjustment {
        if occupancy < self.config.threshold {
            Adjustment::SpeedUp
        } else if occupancy > self.config.threshold {
            Adjustment::SlowDown
        } else {
            Adjustment::Hold
        }
    }

    /// Computes the next delay for the given occupancy.
    pub fn adjust(&mut self, occupancy: usize, delay_secs: f64) -> DelayUpdate {
        let adjustment = self.decide(occupancy);
        let current_secs = match adjustment {
            Adjustment::SpeedUp => {
                self.total_speedups += 1;
                // A delay already under the floor is left alone, never raised.
                self.config
                    .policy
                    .decrease(delay_secs)
                    .max(self.config.floor_secs)
                    .min(delay_secs)
            }
            Adjustment::SlowDown => {
                self.total_slowdowns += 1;
                delay_secs + self.config.increase_secs
            }
            Adjustment::Hold => {
                self.total_holds += 1;
                delay_secs
            }
        };

        DelayUpdate {
            occupancy,
            previous_secs: delay_secs,
            current_secs,
            adjustment,
        }
    }

    /// Runs one tick against locked shared state, writing the new delay back.
    pub fn apply<T>(&mut self, state: &mut SharedState<T>) -> DelayUpdate {
        let update = self.adjust(state.occupancy(), state.production_delay_secs());
        state.set_production_delay_secs(update.current_secs);
        update
    }

    /// Returns statistics about the controller.
    #[must_use]
    pub const fn stats(&self) -> FeedbackStats {
        FeedbackStats {
            total_speedups: self.total_speedups,
            total_slowdowns: self.total_slowdowns,
            total_holds: self.total_holds,
        }
    }
}

/// Statistics about the feedback controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedbackStats {
    /// Ticks that shortened the delay.
    pub total_speedups: u64,
    /// Ticks that lengthened the delay.
    pub total_slowdowns: u64,
    /// Ticks at threshold.
    pub total_holds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::FlowController;

    fn controller(threshold: usize, policy: DelayPolicy) -> FeedbackController {
        FeedbackController::new(FeedbackConfig::new(threshold).with_policy(policy)).unwrap()
    }

    #[test]
    fn test_damping_below_threshold() {
        let mut ctl = controller(5, DelayPolicy::damping());
        let update = ctl.adjust(2, 2.0);
        assert_eq!(update.adjustment, Adjustment::SpeedUp);
        assert!((update.current_secs - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_increase_above_threshold() {
        let mut ctl = controller(5, DelayPolicy::damping());
        let update = ctl.adjust(8, 1.4);
        assert_eq!(update.adjustment, Adjustment::SlowDown);
        assert!((update.current_secs - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_equal_threshold_holds() {
        let mut ctl = controller(5, DelayPolicy::stepped());
        let update = ctl.adjust(5, 3.3);
        assert_eq!(update.adjustment, Adjustment::Hold);
        assert!((update.current_secs - 3.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stepped_policy() {
        let mut ctl = controller(5, DelayPolicy::stepped());

        // Above one step: subtract.
        let update = ctl.adjust(0, 3.5);
        assert!((update.current_secs - 2.5).abs() < 1e-9);

        // Exactly one step is not above it: gentle multiply.
        let update = ctl.adjust(0, 1.0);
        assert!((update.current_secs - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_decrease_is_strictly_monotonic_until_floor() {
        for policy in [DelayPolicy::damping(), DelayPolicy::stepped()] {
            let mut ctl = controller(5, policy);
            let floor = ctl.config().floor_secs;
            let mut delay = 5.0;
            let mut reached_floor = false;

            for _ in 0..200 {
                let next = ctl.adjust(1, delay).current_secs;
                assert!(next >= floor, "{} went under floor", policy.name());
                if delay > floor {
                    assert!(next < delay, "{} did not decrease", policy.name());
                } else {
                    assert!((next - floor).abs() < f64::EPSILON);
                    reached_floor = true;
                }
                delay = next;
            }
            assert!(reached_floor);
        }
    }

    #[test]
    fn test_delay_under_floor_not_raised() {
        let mut ctl = controller(5, DelayPolicy::damping());
        let below = ctl.config().floor_secs / 2.0;
        let update = ctl.adjust(0, below);
        assert!((update.current_secs - below).abs() < f64::EPSILON);
    }

    #[test]
    fn test_increase_is_unbounded() {
        let mut ctl = controller(0, DelayPolicy::damping());
        let mut delay = 1.0;
        for _ in 0..1000 {
            delay = ctl.adjust(1, delay).current_secs;
        }
        assert!((delay - 1001.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let bad = [
            FeedbackConfig::new(1).with_policy(DelayPolicy::Damping { factor: 1.0 }),
            FeedbackConfig::new(1).with_policy(DelayPolicy::Damping { factor: 0.0 }),
            FeedbackConfig::new(1).with_policy(DelayPolicy::Stepped {
                step_secs: 0.0,
                gentle_factor: 0.9,
            }),
            FeedbackConfig::new(1).with_increase_secs(0.0),
            FeedbackConfig::new(1).with_floor_secs(-1.0),
            FeedbackConfig::new(1).with_period(Duration::ZERO),
        ];
        for config in bad {
            assert!(FeedbackController::new(config).is_err());
        }
    }

    #[test]
    fn test_stats() {
        let mut ctl = controller(2, DelayPolicy::damping());
        ctl.adjust(0, 1.0);
        ctl.adjust(2, 1.0);
        ctl.adjust(3, 1.0);
        ctl.adjust(3, 1.0);

        let stats = ctl.stats();
        assert_eq!(stats.total_speedups, 1);
        assert_eq!(stats.total_holds, 1);
        assert_eq!(stats.total_slowdowns, 2);
    }

    #[tokio::test]
    async fn test_apply_writes_shared_state() {
        let flow = FlowController::new(10, 2.0).unwrap();
        flow.insert(1).await.unwrap();
        flow.insert(2).await.unwrap();

        let mut ctl = controller(5, DelayPolicy::damping());
        let update = {
            let mut state = flow.lock().await;
            ctl.apply(&mut *state)
        };

        assert_eq!(update.occupancy, 2);
        assert!((flow.production_delay_secs().await - 1.4).abs() < 1e-9);
    }
}
