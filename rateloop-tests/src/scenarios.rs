//! Reusable parameter sets and seeds.

use std::time::Duration;

use rateloop_core::ControlParameters;
use rateloop_flow::FeedbackConfig;

/// Standard parameter sets.
pub mod params {
    use super::ControlParameters;

    /// Capacity 3, used by the blocking scenario.
    #[must_use]
    pub const fn capacity_three() -> ControlParameters {
        ControlParameters::new(1.0, 2)
            .with_capacity(3)
            .with_consumption_delay_secs(0)
    }

    /// Capacity 10, threshold 5, initial delay 2 s.
    #[must_use]
    pub const fn damping_reference() -> ControlParameters {
        ControlParameters::new(2.0, 5).with_capacity(10)
    }

    /// Fast producer and an instant consumer, for long runs under a paused
    /// clock.
    #[must_use]
    pub const fn fast() -> ControlParameters {
        ControlParameters::new(0.01, 2)
            .with_capacity(4)
            .with_consumption_delay_secs(0)
    }

    /// A consumer so slow the producer fills the queue and blocks.
    #[must_use]
    pub const fn stalled_consumer() -> ControlParameters {
        ControlParameters::new(0.001, 1)
            .with_capacity(2)
            .with_consumption_delay_secs(3600)
    }
}

/// Controller configuration ticking every 100ms.
#[must_use]
pub const fn fast_feedback(threshold: usize) -> FeedbackConfig {
    FeedbackConfig::new(threshold).with_period(Duration::from_millis(100))
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Seeds for payload and fault injection.
    pub const STANDARD: &[u64] = &[1, 7, 42, 1337, 0xdead_beef];
}
