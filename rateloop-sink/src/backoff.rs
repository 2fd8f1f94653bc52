//! Reconnect backoff shared by the network sinks.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{SinkError, SinkResult};

/// Initial reconnect backoff in milliseconds.
const INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum reconnect backoff in milliseconds.
const MAX_BACKOFF_MS: u64 = 5000;

/// Exponential backoff between failed connection attempts.
#[derive(Debug)]
pub(crate) struct Backoff {
    retry_at: Option<Instant>,
    delay_ms: u64,
}

impl Backoff {
    pub(crate) const fn new() -> Self {
        Self {
            retry_at: None,
            delay_ms: INITIAL_BACKOFF_MS,
        }
    }

    /// Fails fast with `SinkError::Unavailable` while a retry is not yet due.
    pub(crate) fn check(&self, target: &str) -> SinkResult<()> {
        let Some(retry_at) = self.retry_at else {
            return Ok(());
        };
        let now = Instant::now();
        if now < retry_at {
            let remaining = retry_at.duration_since(now);
            return Err(SinkError::Unavailable {
                addr: target.to_string(),
                retry_in_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    /// Allows the next attempt immediately without resetting the delay.
    pub(crate) fn skip_wait(&mut self) {
        self.retry_at = None;
    }

    /// Resets after a successful connect.
    pub(crate) fn reset(&mut self) {
        self.retry_at = None;
        self.delay_ms = INITIAL_BACKOFF_MS;
    }

    /// Schedules the next attempt and doubles the delay. Returns the delay
    /// just scheduled, in milliseconds.
    pub(crate) fn failed(&mut self) -> u64 {
        let delay_ms = self.delay_ms;
        self.retry_at = Some(Instant::now() + Duration::from_millis(delay_ms));
        self.delay_ms = (delay_ms * 2).min(MAX_BACKOFF_MS);
        delay_ms
    }
}
