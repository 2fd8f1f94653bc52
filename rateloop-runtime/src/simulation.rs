//! Wiring for a complete simulation.
//!
//! A [`Simulation`] owns the shared state (flow controller, metrics
//! reporter, shutdown token) and hands each role an `Arc` to it. Spawning
//! starts the three roles as tokio tasks and returns a [`SimulationHandle`]
//! used to stop and join them.

use std::sync::Arc;
use std::time::Duration;

use rateloop_core::{ControlParameters, Message, MessageFactory, MessageId};
use rateloop_flow::{FeedbackConfig, FeedbackController, FeedbackStats, FlowController};
use rateloop_sink::{MetricsReporter, MetricsSink, ReporterStats};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::consumer::{Consumer, ConsumerStats};
use crate::error::{RuntimeError, RuntimeResult};
use crate::observer::{NoopObserver, OccupancyObserver};
use crate::producer::{Producer, ProducerStats};
use crate::regulator::Regulator;
use crate::role::Role;

/// Default time allowed for roles to stop after cancellation.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A configured, not yet running simulation.
pub struct Simulation {
    params: ControlParameters,
    flow: Arc<FlowController<Message>>,
    reporter: Arc<MetricsReporter>,
    feedback: FeedbackController,
    observer: Arc<dyn OccupancyObserver>,
    shutdown: CancellationToken,
    seed: Option<u64>,
}

impl Simulation {
    /// Builds a simulation from startup parameters.
    ///
    /// The controller's threshold is always taken from `params`; the rest of
    /// `feedback` (policy, increment, floor, period) is used as given.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Config` for invalid parameters and
    /// `RuntimeError::Flow` if the queue or controller cannot be built.
    pub fn new(
        params: ControlParameters,
        feedback: FeedbackConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> RuntimeResult<Self> {
        params.validate()?;
        if params.threshold_exceeds_capacity() {
            warn!(
                threshold = params.threshold,
                capacity = params.capacity,
                "Threshold exceeds queue capacity; the producer will only ever speed up"
            );
        }

        let feedback = FeedbackController::new(FeedbackConfig {
            threshold: params.threshold,
            ..feedback
        })?;
        let flow = Arc::new(FlowController::new(
            params.capacity,
            params.production_delay_secs,
        )?);

        Ok(Self {
            params,
            flow,
            reporter: Arc::new(MetricsReporter::new(sink)),
            feedback,
            observer: Arc::new(NoopObserver),
            shutdown: CancellationToken::new(),
            seed: None,
        })
    }

    /// Sets the occupancy observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn OccupancyObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Seeds the producer's payload RNG. Without a seed it is drawn from OS
    /// entropy.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns the shared flow controller.
    #[must_use]
    pub const fn flow(&self) -> &Arc<FlowController<Message>> {
        &self.flow
    }

    /// Returns the shared metrics reporter.
    #[must_use]
    pub const fn reporter(&self) -> &Arc<MetricsReporter> {
        &self.reporter
    }

    /// Returns a clone of the shutdown token.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawns the producer, consumer and controller on the current tokio
    /// runtime.
    ///
    /// When any role exits, for whatever reason, the others are cancelled.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> SimulationHandle {
        let Self {
            params,
            flow,
            reporter,
            feedback,
            observer,
            shutdown,
            seed,
        } = self;

        let factory = seed.map_or_else(MessageFactory::from_entropy, MessageFactory::with_seed);
        let producer = Producer::new(flow.clone(), reporter.clone(), factory, shutdown.clone());
        let consumer = Consumer::new(
            flow.clone(),
            reporter.clone(),
            observer,
            params.consumption_delay(),
            shutdown.clone(),
        );
        let regulator = Regulator::new(flow.clone(), reporter.clone(), feedback, shutdown.clone());

        info!(
            production_delay_secs = params.production_delay_secs,
            consumption_delay_secs = params.consumption_delay_secs,
            threshold = params.threshold,
            capacity = params.capacity,
            sink = reporter.sink_name(),
            "Starting simulation"
        );

        let producer = spawn_role(&shutdown, producer.run());
        let consumer = spawn_role(&shutdown, consumer.run());
        let controller = spawn_role(&shutdown, regulator.run());

        SimulationHandle {
            flow,
            reporter,
            shutdown,
            producer,
            consumer,
            controller,
        }
    }
}

/// Spawns a role whose exit cancels `shutdown`.
fn spawn_role<F, T>(shutdown: &CancellationToken, role: F) -> JoinHandle<RuntimeResult<T>>
where
    F: std::future::Future<Output = RuntimeResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let guard = shutdown.clone().drop_guard();
    tokio::spawn(async move {
        let _guard = guard;
        role.await
    })
}

/// Handle to a running simulation.
pub struct SimulationHandle {
    flow: Arc<FlowController<Message>>,
    reporter: Arc<MetricsReporter>,
    shutdown: CancellationToken,
    producer: JoinHandle<RuntimeResult<ProducerStats>>,
    consumer: JoinHandle<RuntimeResult<ConsumerStats>>,
    controller: JoinHandle<RuntimeResult<FeedbackStats>>,
}

impl SimulationHandle {
    /// Returns the shared flow controller.
    #[must_use]
    pub const fn flow(&self) -> &Arc<FlowController<Message>> {
        &self.flow
    }

    /// Returns a clone of the shutdown token.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Returns whether every role has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.producer.is_finished() && self.consumer.is_finished() && self.controller.is_finished()
    }

    /// Cancels all roles and waits up to [`DEFAULT_SHUTDOWN_TIMEOUT`] for
    /// them to stop.
    ///
    /// # Errors
    ///
    /// See [`shutdown_with_timeout`](Self::shutdown_with_timeout).
    pub async fn shutdown(self) -> RuntimeResult<SimulationReport> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Cancels all roles and waits up to `timeout` for them to stop.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::ShutdownTimeout` if a role is still running
    /// after `timeout`, or the first error a role returned.
    pub async fn shutdown_with_timeout(self, timeout: Duration) -> RuntimeResult<SimulationReport> {
        info!("Stopping simulation");
        self.shutdown.cancel();
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::ShutdownTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Waits for all roles to exit without cancelling them.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::TaskFailed` if a role panicked, or the first
    /// error a role returned.
    pub async fn wait(self) -> RuntimeResult<SimulationReport> {
        let producer = join_role(Role::Producer, self.producer.await)?;
        let consumer = join_role(Role::Consumer, self.consumer.await)?;
        let feedback = join_role(Role::Controller, self.controller.await)?;

        let (occupancy, production_delay_secs) = {
            let state = self.flow.lock().await;
            (state.occupancy(), state.production_delay_secs())
        };

        let report = SimulationReport {
            produced: producer.produced,
            consumed: consumer.consumed,
            last_consumed: consumer.last_id,
            occupancy,
            production_delay_secs,
            feedback,
            metrics: self.reporter.stats(),
        };
        info!(
            produced = report.produced,
            consumed = report.consumed,
            occupancy = report.occupancy,
            metric_failures = report.metrics.failures,
            "Simulation stopped"
        );
        Ok(report)
    }
}

fn join_role<T>(role: Role, joined: Result<RuntimeResult<T>, JoinError>) -> RuntimeResult<T> {
    joined.map_err(|e| RuntimeError::TaskFailed {
        role,
        message: e.to_string(),
    })?
}

/// Summary of a finished simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationReport {
    /// Messages inserted by the producer.
    pub produced: u64,
    /// Messages removed by the consumer.
    pub consumed: u64,
    /// Id of the last message removed.
    pub last_consumed: Option<MessageId>,
    /// Messages left in the queue.
    pub occupancy: usize,
    /// Production delay at shutdown, in seconds.
    pub production_delay_secs: f64,
    /// Controller tick counts.
    pub feedback: FeedbackStats,
    /// Metric sample counts.
    pub metrics: ReporterStats,
}

impl SimulationReport {
    /// Returns whether every produced message was either consumed or is
    /// still queued, and removals followed insertion order.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let accounted = self.consumed + self.occupancy as u64 == self.produced;
        let in_order = match self.last_consumed {
            Some(id) => id.get() + 1 == self.consumed,
            None => self.consumed == 0,
        };
        accounted && in_order
    }
}
