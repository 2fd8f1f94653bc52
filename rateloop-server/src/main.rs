//! Rateloop simulation binary.
//!
//! Runs a producer, a consumer and a delay controller over one bounded
//! queue until Ctrl-C (or `--run-for` seconds):
//!
//! ```bash
//! rateloop --message-delay 2 --threshold 5
//! rateloop --md 0.5 --cd 1 -t 3 --mql 6 --policy stepped --sink redis
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use rateloop_runtime::Simulation;
use rateloop_server::{Args, QueueGauge};

/// Sleeps for `secs`, or forever if unset.
async fn run_for(secs: Option<u64>) {
    match secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the gauge.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let params = args.control_parameters().map_err(|e| {
        error!(error = %e, "Invalid parameters");
        e
    })?;
    let feedback = args.feedback_config();

    let policy = feedback.policy.name();

    let sink = args.build_sink().await;
    let mut simulation = Simulation::new(params, feedback, sink).map_err(|e| {
        error!(error = %e, "Failed to set up simulation");
        e
    })?;
    info!(
        message_delay = params.production_delay_secs,
        consumption_delay = params.consumption_delay_secs,
        threshold = params.threshold,
        max_queue_length = params.capacity,
        policy,
        sink = simulation.reporter().sink_name(),
        "Program parameters"
    );
    if !args.no_gauge {
        simulation = simulation.with_observer(Arc::new(QueueGauge::stdout()));
    }

    let handle = simulation.spawn();
    let roles_done = handle.shutdown_token();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl-C");
        }
        () = run_for(args.run_for) => {
            info!("Run time elapsed");
        }
        () = roles_done.cancelled() => {
            warn!("A role exited early");
        }
    }

    let report = handle.shutdown().await?;
    info!(
        produced = report.produced,
        consumed = report.consumed,
        final_occupancy = report.occupancy,
        final_delay_secs = report.production_delay_secs,
        metric_failures = report.metrics.failures,
        "Done"
    );
    Ok(())
}
