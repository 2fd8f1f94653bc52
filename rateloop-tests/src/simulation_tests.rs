//! Whole-simulation tests: all three roles running on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use rateloop_core::{MessageFactory, MessageId};
use rateloop_flow::FlowController;
use rateloop_runtime::{Consumer, NoopObserver, Producer, Simulation};
use rateloop_sink::{
    MetricsReporter, MetricsSink, SimulatedSink, SinkFaultConfig, DELAY_SERIES,
    OCCUPANCY_SERIES,
};
use tokio_util::sync::CancellationToken;

use crate::observers::RecordingObserver;
use crate::properties::{check_permits_at_rest, queued_ids, PropertyChecker};
use crate::scenarios::{fast_feedback, params, seeds};

#[tokio::test]
async fn test_sink_failures_do_not_affect_queue() {
    const OPS: u64 = 1000;
    let flow = Arc::new(FlowController::new(4, 0.01).unwrap());
    let sink = SimulatedSink::with_faults(1, SinkFaultConfig::always_failing());
    let reporter = Arc::new(MetricsReporter::new(Arc::new(sink.clone())));
    let shutdown = CancellationToken::new();
    let mut producer = Producer::new(
        flow.clone(),
        reporter.clone(),
        MessageFactory::with_seed(1),
        shutdown.clone(),
    );
    let mut consumer = Consumer::new(
        flow.clone(),
        reporter.clone(),
        Arc::new(NoopObserver),
        Duration::ZERO,
        shutdown,
    );
    let mut checker = PropertyChecker::new(4);

    for _ in 0..OPS {
        let produced = producer.produce_one().await.unwrap();
        checker.record_insert(produced.id, produced.occupancy);
        let message = consumer.consume_one().await.unwrap();
        checker.record_remove(message.id(), flow.occupancy().await);
    }

    checker.check_accounted(&queued_ids(&flow).await);
    checker.assert_valid();
    assert_eq!(check_permits_at_rest(&flow).await, None);
    assert_eq!(producer.stats().produced, OPS);
    assert_eq!(consumer.stats().consumed, OPS);

    let stats = reporter.stats();
    assert_eq!(stats.failures, 2 * OPS);
    assert_eq!(stats.recorded, 0);
    assert_eq!(sink.failure_count(), 2 * OPS);
    assert_eq!(sink.sample_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_simulation_runs_with_failing_sink() {
    let sink = SimulatedSink::with_faults(3, SinkFaultConfig::always_failing());
    let handle = Simulation::new(params::fast(), fast_feedback(0), Arc::new(sink.clone()))
        .unwrap()
        .with_seed(3)
        .spawn();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!handle.is_finished());

    let report = handle.shutdown().await.unwrap();
    assert!(report.produced > 100, "{report:?}");
    assert!(report.consumed > 100, "{report:?}");
    assert!(report.is_consistent(), "{report:?}");
    assert!(report.feedback.total_speedups + report.feedback.total_holds > 0);
    assert_eq!(report.metrics.recorded, 0);
    assert_eq!(report.metrics.failures, sink.failure_count());
}

#[tokio::test(start_paused = true)]
async fn test_simulation_end_to_end() {
    let sink = SimulatedSink::new(11);
    let observer = Arc::new(RecordingObserver::new());
    let params = params::fast();
    let handle = Simulation::new(params, fast_feedback(params.threshold), Arc::new(sink.clone()))
        .unwrap()
        .with_observer(observer.clone())
        .with_seed(11)
        .spawn();
    let flow = handle.flow().clone();

    tokio::time::sleep(Duration::from_secs(3)).await;
    let report = handle.shutdown().await.unwrap();

    assert!(report.is_consistent(), "{report:?}");
    assert!(report.consumed > 0);
    assert_eq!(report.last_consumed, Some(MessageId::new(report.consumed - 1)));
    assert_eq!(observer.count() as u64, report.consumed);
    assert!(observer.all_within_bounds());
    assert!(observer
        .samples()
        .iter()
        .all(|&(_, capacity)| capacity == params.capacity));

    let occupancy = sink.values(OCCUPANCY_SERIES);
    assert_eq!(occupancy.len() as u64, report.produced + report.consumed);
    #[allow(clippy::cast_precision_loss)]
    let capacity = params.capacity as f64;
    assert!(occupancy.iter().all(|&v| (0.0..=capacity).contains(&v)));

    let ticks = report.feedback.total_speedups
        + report.feedback.total_slowdowns
        + report.feedback.total_holds;
    assert_eq!(sink.values(DELAY_SERIES).len() as u64, ticks);
    assert!(ticks >= 30, "expected a tick every 100ms, got {ticks}");
    assert!(report.production_delay_secs >= 0.001);

    assert_eq!(report.metrics.failures, 0);
    assert_eq!(report.metrics.recorded, sink.sample_count() as u64);
    assert_eq!(check_permits_at_rest(&flow).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_with_blocked_producer() {
    // Capacity 2 and a consumer that sleeps an hour after its first removal:
    // the producer ends up parked on a full queue.
    let params = params::stalled_consumer();
    let handle = Simulation::new(params, fast_feedback(params.threshold), Arc::new(SimulatedSink::new(0)))
        .unwrap()
        .with_seed(5)
        .spawn();
    let flow = handle.flow().clone();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(flow.occupancy().await, 2);
    assert_eq!(flow.available_slots(), 0);

    let report = handle
        .shutdown_with_timeout(Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(report.produced, 3);
    assert_eq!(report.consumed, 1);
    assert_eq!(report.occupancy, 2);
    assert_eq!(report.last_consumed, Some(MessageId::FIRST));
    assert!(report.is_consistent());
    assert_eq!(check_permits_at_rest(&flow).await, None);
    assert_eq!(queued_ids(&flow).await, vec![MessageId::new(1), MessageId::new(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_simulation_flaky_sink_across_seeds() {
    for &seed in seeds::STANDARD {
        let sink = SimulatedSink::with_faults(seed, SinkFaultConfig::none().with_fail_rate(0.3));
        let dyn_sink: Arc<dyn MetricsSink> = Arc::new(sink.clone());
        let handle = Simulation::new(params::fast(), fast_feedback(2), dyn_sink)
            .unwrap()
            .with_seed(seed)
            .spawn();

        tokio::time::sleep(Duration::from_secs(2)).await;
        let report = handle.shutdown().await.unwrap();

        assert!(report.is_consistent(), "seed {seed}: {report:?}");
        assert!(report.metrics.failures > 0, "seed {seed}: {report:?}");
        assert!(report.metrics.recorded > 0, "seed {seed}: {report:?}");
        assert_eq!(report.metrics.failures, sink.failure_count());
        assert_eq!(report.metrics.recorded, sink.sample_count() as u64);
    }
}

#[tokio::test(start_paused = true)]
async fn test_external_cancel_stops_all_roles() {
    let simulation = Simulation::new(
        params::capacity_three(),
        fast_feedback(2),
        Arc::new(SimulatedSink::new(2)),
    )
    .unwrap()
    .with_seed(2);
    let token = simulation.shutdown_token();
    let handle = simulation.spawn();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    token.cancel();

    let report = handle.wait().await.unwrap();
    assert!(report.produced >= 2, "{report:?}");
    assert!(report.is_consistent(), "{report:?}");
}
