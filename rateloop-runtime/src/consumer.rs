//! Consumer role.

use std::sync::Arc;
use std::time::Duration;

use rateloop_core::{Message, MessageId};
use rateloop_flow::{FlowController, FlowError, FlowResult};
use rateloop_sink::{MetricsReporter, OCCUPANCY_SERIES};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::RuntimeResult;
use crate::observer::OccupancyObserver;

/// Counters reported when the consumer stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumerStats {
    /// Messages removed.
    pub consumed: u64,
    /// Id of the most recently removed message.
    pub last_id: Option<MessageId>,
}

/// Removes messages from the queue at a fixed pace until cancelled.
pub struct Consumer {
    flow: Arc<FlowController<Message>>,
    reporter: Arc<MetricsReporter>,
    observer: Arc<dyn OccupancyObserver>,
    delay: Duration,
    shutdown: CancellationToken,
    stats: ConsumerStats,
}

impl Consumer {
    /// Creates a consumer sleeping `delay` after every removal.
    #[must_use]
    pub fn new(
        flow: Arc<FlowController<Message>>,
        reporter: Arc<MetricsReporter>,
        observer: Arc<dyn OccupancyObserver>,
        delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            flow,
            reporter,
            observer,
            delay,
            shutdown,
            stats: ConsumerStats::default(),
        }
    }

    /// Returns the counters so far.
    #[must_use]
    pub const fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Removes the front message, waiting for one to be available.
    ///
    /// The occupancy sample and the observer call happen before the lock is
    /// released.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Closed` if the flow controller was closed.
    pub async fn consume_one(&mut self) -> FlowResult<Message> {
        let mut guard = self.flow.reserve_item().await?;
        let message = guard.pop()?;
        self.stats.consumed += 1;
        self.stats.last_id = Some(message.id());
        let occupancy = guard.occupancy();
        debug!(
            id = message.id().get(),
            payload = message.payload(),
            occupancy,
            "Consumed message"
        );

        self.reporter
            .report_count(OCCUPANCY_SERIES, occupancy)
            .await;
        self.observer.on_removal(occupancy, guard.capacity());
        drop(guard);

        Ok(message)
    }

    /// Runs until the shutdown token is cancelled or the flow controller is
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns an error if a removal fails for any reason other than
    /// shutdown.
    pub async fn run(mut self) -> RuntimeResult<ConsumerStats> {
        let shutdown = self.shutdown.clone();
        info!(delay_secs = self.delay.as_secs(), "Consumer started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                result = self.consume_one() => match result {
                    Ok(_) => {}
                    Err(FlowError::Closed) => break,
                    Err(e) => return Err(e.into()),
                },
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.delay) => {}
            }
        }

        info!(consumed = self.stats.consumed, "Consumer stopped");
        Ok(self.stats)
    }
}
