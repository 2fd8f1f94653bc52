//! Producer role.
//!
//! Each iteration reserves a free slot, then under the queue lock builds the
//! next message, inserts it, reports the new occupancy and reads the current
//! production delay. The lock is released before sleeping for that delay.

use std::sync::Arc;
use std::time::Duration;

use rateloop_core::{secs_to_duration, Message, MessageFactory, MessageId};
use rateloop_flow::{FlowController, FlowError, FlowResult};
use rateloop_sink::{MetricsReporter, OCCUPANCY_SERIES};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::RuntimeResult;

/// Outcome of one insert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Produced {
    /// Id of the inserted message.
    pub id: MessageId,
    /// Occupancy right after the insert.
    pub occupancy: usize,
    /// Production delay observed under the lock.
    pub delay: Duration,
}

/// Counters reported when the producer stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerStats {
    /// Messages inserted.
    pub produced: u64,
}

/// Inserts messages into the queue until cancelled.
pub struct Producer {
    flow: Arc<FlowController<Message>>,
    reporter: Arc<MetricsReporter>,
    factory: MessageFactory,
    shutdown: CancellationToken,
    stats: ProducerStats,
}

impl Producer {
    /// Creates a producer.
    #[must_use]
    pub fn new(
        flow: Arc<FlowController<Message>>,
        reporter: Arc<MetricsReporter>,
        factory: MessageFactory,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            flow,
            reporter,
            factory,
            shutdown,
            stats: ProducerStats::default(),
        }
    }

    /// Returns the counters so far.
    #[must_use]
    pub const fn stats(&self) -> ProducerStats {
        self.stats
    }

    /// Inserts one message, waiting for a free slot.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Closed` if the flow controller was closed.
    pub async fn produce_one(&mut self) -> FlowResult<Produced> {
        let mut guard = self.flow.reserve_slot().await?;

        let message = self.factory.next_message();
        let id = message.id();
        debug!(id = id.get(), payload = message.payload(), "Produced message");
        let occupancy = guard.push(message)?;
        self.stats.produced += 1;

        self.reporter
            .report_count(OCCUPANCY_SERIES, occupancy)
            .await;
        let delay = secs_to_duration(guard.production_delay_secs());
        drop(guard);

        Ok(Produced {
            id,
            occupancy,
            delay,
        })
    }

    /// Runs until the shutdown token is cancelled or the flow controller is
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns an error if an insert fails for any reason other than
    /// shutdown.
    pub async fn run(mut self) -> RuntimeResult<ProducerStats> {
        let shutdown = self.shutdown.clone();
        info!("Producer started");

        loop {
            let produced = tokio::select! {
                () = shutdown.cancelled() => break,
                result = self.produce_one() => match result {
                    Ok(produced) => produced,
                    Err(FlowError::Closed) => break,
                    Err(e) => return Err(e.into()),
                },
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(produced.delay) => {}
            }
        }

        info!(produced = self.stats.produced, "Producer stopped");
        Ok(self.stats)
    }
}
