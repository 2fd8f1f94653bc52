//! Controller role: drives the feedback loop on the production delay.
//!
//! Every period the regulator locks the shared state, lets the
//! [`FeedbackController`] rewrite the production delay from the current
//! occupancy, and reports the result to the `delay_metrics` series before
//! releasing the lock.

use std::sync::Arc;

use rateloop_core::Message;
use rateloop_flow::{Adjustment, DelayUpdate, FeedbackController, FeedbackStats, FlowController};
use rateloop_sink::{MetricsReporter, DELAY_SERIES};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::RuntimeResult;

/// Periodically adjusts the production delay until cancelled.
pub struct Regulator {
    flow: Arc<FlowController<Message>>,
    reporter: Arc<MetricsReporter>,
    feedback: FeedbackController,
    shutdown: CancellationToken,
}

impl Regulator {
    /// Creates a regulator.
    #[must_use]
    pub fn new(
        flow: Arc<FlowController<Message>>,
        reporter: Arc<MetricsReporter>,
        feedback: FeedbackController,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            flow,
            reporter,
            feedback,
            shutdown,
        }
    }

    /// Returns the feedback controller.
    #[must_use]
    pub const fn feedback(&self) -> &FeedbackController {
        &self.feedback
    }

    /// Runs one adjustment under the lock.
    pub async fn tick(&mut self) -> DelayUpdate {
        let mut state = self.flow.lock().await;
        let update = self.feedback.apply(&mut *state);
        self.reporter
            .report(DELAY_SERIES, update.current_secs)
            .await;
        drop(state);

        match update.adjustment {
            Adjustment::Hold => debug!(
                occupancy = update.occupancy,
                delay_secs = update.current_secs,
                "Occupancy at threshold, delay unchanged"
            ),
            adjustment => info!(
                occupancy = update.occupancy,
                previous_secs = update.previous_secs,
                delay_secs = update.current_secs,
                ?adjustment,
                "Adjusted production delay"
            ),
        }
        update
    }

    /// Ticks once per period until the shutdown token is cancelled.
    ///
    /// The first tick runs immediately.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature matches the other roles.
    pub async fn run(mut self) -> RuntimeResult<FeedbackStats> {
        let shutdown = self.shutdown.clone();
        let period = self.feedback.config().period;
        info!(
            threshold = self.feedback.config().threshold,
            policy = self.feedback.config().policy.name(),
            period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "Controller started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(period) => {}
            }
        }

        let stats = self.feedback.stats();
        info!(
            speedups = stats.total_speedups,
            slowdowns = stats.total_slowdowns,
            holds = stats.total_holds,
            "Controller stopped"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rateloop_core::MessageId;
    use rateloop_flow::FeedbackConfig;
    use rateloop_sink::SimulatedSink;

    use super::*;

    fn regulator(capacity: usize, threshold: usize, delay_secs: f64) -> (Regulator, SimulatedSink) {
        let flow = Arc::new(FlowController::new(capacity, delay_secs).unwrap());
        let sink = SimulatedSink::new(0);
        let reporter = Arc::new(MetricsReporter::new(Arc::new(sink.clone())));
        let feedback = FeedbackController::new(
            FeedbackConfig::new(threshold).with_period(Duration::from_millis(100)),
        )
        .unwrap();
        (
            Regulator::new(flow, reporter, feedback, CancellationToken::new()),
            sink,
        )
    }

    async fn fill(flow: &FlowController<Message>, count: u64) {
        for id in 0..count {
            flow.insert(Message::new(MessageId::new(id), "x")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_tick_writes_delay_back_and_reports() {
        let (mut regulator, sink) = regulator(10, 5, 2.0);
        fill(&regulator.flow, 2).await;

        let update = regulator.tick().await;
        assert_eq!(update.adjustment, Adjustment::SpeedUp);
        assert!((update.current_secs - 1.4).abs() < 1e-9);
        assert!((regulator.flow.production_delay_secs().await - 1.4).abs() < 1e-9);

        let reported = sink.values(DELAY_SERIES);
        assert_eq!(reported.len(), 1);
        assert!((reported[0] - 1.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_tick_at_threshold_holds() {
        let (mut regulator, sink) = regulator(4, 2, 0.75);
        fill(&regulator.flow, 2).await;

        let update = regulator.tick().await;
        assert_eq!(update.adjustment, Adjustment::Hold);
        assert_eq!(sink.values(DELAY_SERIES), vec![0.75]);
        assert_eq!(regulator.feedback().stats().total_holds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_once_per_period() {
        let (regulator, sink) = regulator(10, 5, 2.0);
        let shutdown = regulator.shutdown.clone();

        let task = tokio::spawn(regulator.run());
        // Ticks at 0, 100, 200 and 300ms.
        tokio::time::sleep(Duration::from_millis(350)).await;
        shutdown.cancel();

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.total_speedups, 4);
        assert_eq!(sink.values(DELAY_SERIES).len(), 4);
    }
}
