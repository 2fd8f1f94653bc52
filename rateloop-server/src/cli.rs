//! Command-line arguments.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use rateloop_core::{
    ConfigResult, ControlParameters, DEFAULT_CAPACITY, DEFAULT_CONSUMPTION_DELAY_SECS,
};
use rateloop_flow::{DelayPolicy, FeedbackConfig};
use rateloop_sink::{
    redact_url, LogSink, MetricsSink, NoopSink, PostgresConfig, PostgresSink, RedisConfig,
    RedisTimeSeriesSink,
};
use tracing::{info, warn, Level};

/// How the controller shortens the production delay below threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum PolicyKind {
    /// Multiply the delay by `--damping-factor`.
    #[default]
    Damping,
    /// Subtract one second while the delay exceeds it, then multiply by 0.9.
    Stepped,
}

/// Where metric samples go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum SinkKind {
    /// Discard samples.
    None,
    /// Log samples at debug level.
    #[default]
    Log,
    /// Write samples to Redis TimeSeries.
    Redis,
    /// Write samples to PostgreSQL or Timescale tables.
    Postgres,
}

/// Producer/consumer simulation with an occupancy-tracking delay controller.
#[derive(Parser, Debug)]
#[command(name = "rateloop")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Initial production delay in seconds.
    #[arg(
        long = "message-delay",
        short = 'm',
        visible_alias = "md",
        alias = "production-delay",
        allow_negative_numbers = true
    )]
    pub message_delay: f64,

    /// Consumer delay in seconds.
    #[arg(
        long = "consumption-delay",
        short = 'c',
        visible_alias = "cd",
        default_value_t = DEFAULT_CONSUMPTION_DELAY_SECS
    )]
    pub consumption_delay: u64,

    /// Occupancy the controller steers toward.
    #[arg(long, short = 't')]
    pub threshold: usize,

    /// Queue capacity.
    #[arg(
        long = "max-queue-length",
        short = 'q',
        visible_aliases = ["mql", "capacity"],
        default_value_t = DEFAULT_CAPACITY
    )]
    pub max_queue_length: usize,

    /// Delay decrease policy.
    #[arg(long, value_enum, default_value = "damping")]
    pub policy: PolicyKind,

    /// Multiplier for the damping policy, in (0, 1).
    #[arg(long, default_value_t = DelayPolicy::DEFAULT_DAMPING_FACTOR)]
    pub damping_factor: f64,

    /// Metrics backend.
    #[arg(long, value_enum, default_value = "log")]
    pub sink: SinkKind,

    /// Redis server address for `--sink redis`.
    #[arg(long, default_value = RedisConfig::DEFAULT_ADDR)]
    pub redis_addr: String,

    /// Connection string for `--sink postgres`.
    #[arg(long, default_value = PostgresConfig::DEFAULT_URL)]
    pub postgres_url: String,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long, value_name = "SECS")]
    pub run_for: Option<u64>,

    /// Do not print the queue gauge after each removal.
    #[arg(long)]
    pub no_gauge: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: Level,
}

impl Args {
    /// Builds and validates the startup parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn control_parameters(&self) -> ConfigResult<ControlParameters> {
        ControlParameters::builder()
            .production_delay_secs(self.message_delay)
            .consumption_delay_secs(self.consumption_delay)
            .threshold(self.threshold)
            .capacity(self.max_queue_length)
            .build()
    }

    /// Returns the selected decrease policy.
    #[must_use]
    pub const fn delay_policy(&self) -> DelayPolicy {
        match self.policy {
            PolicyKind::Damping => DelayPolicy::Damping {
                factor: self.damping_factor,
            },
            PolicyKind::Stepped => DelayPolicy::stepped(),
        }
    }

    /// Returns the controller configuration.
    #[must_use]
    pub const fn feedback_config(&self) -> FeedbackConfig {
        FeedbackConfig::new(self.threshold).with_policy(self.delay_policy())
    }

    /// Builds the selected metrics sink.
    ///
    /// For Redis and PostgreSQL an initial connection is attempted; failure is logged and
    /// the sink keeps retrying in the background of later writes.
    pub async fn build_sink(&self) -> Arc<dyn MetricsSink> {
        match self.sink {
            SinkKind::None => Arc::new(NoopSink),
            SinkKind::Log => Arc::new(LogSink),
            SinkKind::Redis => {
                let sink = RedisTimeSeriesSink::new(RedisConfig::new(self.redis_addr.as_str()));
                match sink.connect().await {
                    Ok(()) => info!(addr = %self.redis_addr, "Redis sink ready"),
                    Err(e) => warn!(
                        addr = %self.redis_addr,
                        error = %e,
                        "Redis unavailable at startup, samples will be dropped until it connects"
                    ),
                }
                Arc::new(sink)
            }
            SinkKind::Postgres => {
                let target = redact_url(&self.postgres_url);
                let sink = PostgresSink::new(PostgresConfig::new(self.postgres_url.as_str()));
                match sink.connect().await {
                    Ok(()) => info!(%target, "PostgreSQL sink ready"),
                    Err(e) => warn!(
                        %target,
                        error = %e,
                        "PostgreSQL unavailable at startup, samples will be dropped until it connects"
                    ),
                }
                Arc::new(sink)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use rateloop_core::ConfigError;

    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("rateloop").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--message-delay", "2", "--threshold", "5"]).unwrap();
        assert!((args.message_delay - 2.0).abs() < f64::EPSILON);
        assert_eq!(args.threshold, 5);
        assert_eq!(args.consumption_delay, 2);
        assert_eq!(args.max_queue_length, 10);
        assert_eq!(args.policy, PolicyKind::Damping);
        assert_eq!(args.sink, SinkKind::Log);
        assert_eq!(args.redis_addr, "127.0.0.1:6379");
        assert_eq!(args.postgres_url, "postgres://postgres@127.0.0.1:5432/rateloop");
        assert_eq!(args.run_for, None);
        assert!(!args.no_gauge);
        assert_eq!(args.log_level, Level::INFO);
    }

    #[test]
    fn test_aliases() {
        let args = parse(&["--md", "1.5", "--cd", "0", "-t", "3", "--mql", "4"]).unwrap();
        assert!((args.message_delay - 1.5).abs() < f64::EPSILON);
        assert_eq!(args.consumption_delay, 0);
        assert_eq!(args.threshold, 3);
        assert_eq!(args.max_queue_length, 4);

        let args = parse(&["--production-delay", "3", "-t", "1", "--capacity", "7"]).unwrap();
        assert!((args.message_delay - 3.0).abs() < f64::EPSILON);
        assert_eq!(args.max_queue_length, 7);

        let args = parse(&["-m", "0.5", "-c", "1", "-t", "2", "-q", "3"]).unwrap();
        assert_eq!(args.consumption_delay, 1);
        assert_eq!(args.max_queue_length, 3);
    }

    #[test]
    fn test_missing_required_rejected() {
        let err = parse(&["--threshold", "5"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = parse(&["--message-delay", "2"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = parse(&["--md", "2", "-t", "5", "--bogus", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_control_parameters() {
        let args = parse(&["--md", "2", "-t", "5", "--mql", "8", "--cd", "1"]).unwrap();
        let params = args.control_parameters().unwrap();
        assert_eq!(params, ControlParameters::new(2.0, 5).with_capacity(8).with_consumption_delay_secs(1));
    }

    #[test]
    fn test_semantic_validation() {
        let args = parse(&["--md", "0", "-t", "5"]).unwrap();
        assert!(matches!(
            args.control_parameters(),
            Err(ConfigError::Invalid { name: "production_delay", .. })
        ));

        let args = parse(&["--md", "-1", "-t", "5"]).unwrap();
        assert!(args.control_parameters().is_err());

        let args = parse(&["--md", "1", "-t", "5", "--mql", "0"]).unwrap();
        assert!(matches!(
            args.control_parameters(),
            Err(ConfigError::Invalid { name: "capacity", .. })
        ));
    }

    #[test]
    fn test_policy_selection() {
        let args = parse(&["--md", "1", "-t", "1"]).unwrap();
        assert_eq!(args.delay_policy(), DelayPolicy::Damping { factor: 0.7 });

        let args = parse(&["--md", "1", "-t", "1", "--damping-factor", "0.5"]).unwrap();
        assert_eq!(args.delay_policy(), DelayPolicy::Damping { factor: 0.5 });

        let args = parse(&["--md", "1", "-t", "4", "--policy", "stepped"]).unwrap();
        assert_eq!(args.delay_policy(), DelayPolicy::stepped());
        assert_eq!(args.feedback_config().threshold, 4);
    }

    #[tokio::test]
    async fn test_build_sink() {
        let args = parse(&["--md", "1", "-t", "1", "--sink", "none"]).unwrap();
        assert_eq!(args.build_sink().await.name(), "none");

        let args = parse(&["--md", "1", "-t", "1"]).unwrap();
        assert_eq!(args.build_sink().await.name(), "log");

        // Nothing listens on port 1; startup must still yield the sink.
        let args = parse(&[
            "--md",
            "1",
            "-t",
            "1",
            "--sink",
            "postgres",
            "--postgres-url",
            "postgres://rateloop@127.0.0.1:1/rateloop",
        ])
        .unwrap();
        assert_eq!(args.build_sink().await.name(), "postgres");
    }
}
