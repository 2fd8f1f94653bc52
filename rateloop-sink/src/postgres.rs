//! PostgreSQL (or Timescale) backend.
//!
//! Each series is a table with `(timestamp, metric_value)` columns. A sample
//! becomes one parameterized insert stamped with the server's `now()`:
//!
//! ```sql
//! INSERT INTO "metrics" ("timestamp", metric_value) VALUES (now(), $1::float8)
//! ```
//!
//! The connection is opened lazily, re-opened after it closes, and failed
//! connects back off the same way as the Redis sink. Statements are prepared
//! once per series and per connection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Statement};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{SinkError, SinkResult};
use crate::sink::MetricsSink;

/// Longest identifier PostgreSQL keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Configuration for the PostgreSQL sink.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection string, either a `postgres://` URL or `key=value` pairs.
    pub url: String,

    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,

    /// Timeout for each insert.
    pub io_timeout: Duration,
}

impl PostgresConfig {
    /// Default connection string.
    pub const DEFAULT_URL: &'static str = "postgres://postgres@127.0.0.1:5432/rateloop";

    /// Creates a configuration for `url` with default timeouts.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_secs(1),
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the insert timeout.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_URL)
    }
}

/// Builds the insert statement for `series`.
///
/// Table names cannot be bound as parameters, so the series must be a plain
/// identifier (`[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes). It is quoted in
/// the statement; only the value is a parameter.
///
/// # Errors
///
/// Returns `SinkError::InvalidSeries` for any other name.
pub fn insert_statement(series: &str) -> SinkResult<String> {
    if !is_identifier(series) {
        return Err(SinkError::InvalidSeries {
            series: series.to_string(),
        });
    }
    Ok(format!(
        "INSERT INTO \"{series}\" (\"timestamp\", metric_value) VALUES (now(), $1::float8)"
    ))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Returns the connection string with any password masked, for logging.
#[must_use]
pub fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let (scheme, rest) = url.split_at(scheme_end + 3);
        let authority_end = rest.find('/').unwrap_or(rest.len());
        if let Some(at) = rest[..authority_end].rfind('@') {
            if let Some(colon) = rest[..at].find(':') {
                return format!("{scheme}{}:***{}", &rest[..colon], &rest[at..]);
            }
        }
        return url.to_string();
    }

    url.split_whitespace()
        .map(|pair| {
            if pair.starts_with("password=") {
                "password=***"
            } else {
                pair
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Open client plus the statements prepared on it.
struct PgState {
    client: Option<Client>,
    statements: HashMap<String, Statement>,
    backoff: Backoff,
}

impl PgState {
    fn disconnect(&mut self) {
        self.client = None;
        self.statements.clear();
    }
}

/// Sink inserting samples into one PostgreSQL table per series.
pub struct PostgresSink {
    config: PostgresConfig,
    /// Connection string safe to log.
    target: String,
    state: Mutex<PgState>,
}

impl PostgresSink {
    /// Creates a sink. No connection is made until the first record or an
    /// explicit [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: PostgresConfig) -> Self {
        let target = redact_url(&config.url);
        Self {
            config,
            target,
            state: Mutex::new(PgState {
                client: None,
                statements: HashMap::new(),
                backoff: Backoff::new(),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PostgresConfig {
        &self.config
    }

    /// Connects now if not already connected, ignoring any backoff.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Connect` if the server is unreachable or refuses
    /// the connection.
    pub async fn connect(&self) -> SinkResult<()> {
        let mut state = self.state.lock().await;
        state.backoff.skip_wait();
        self.ensure_connected(&mut state).await
    }

    /// Returns whether an open connection is held.
    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .client
            .as_ref()
            .is_some_and(|client| !client.is_closed())
    }

    async fn ensure_connected(&self, state: &mut PgState) -> SinkResult<()> {
        if state.client.as_ref().is_some_and(Client::is_closed) {
            debug!(target = %self.target, "PostgreSQL connection closed");
            state.disconnect();
        }
        if state.client.is_some() {
            return Ok(());
        }
        state.backoff.check(&self.target)?;

        match self.open().await {
            Ok(client) => {
                info!(target = %self.target, "Connected to PostgreSQL");
                state.backoff.reset();
                state.client = Some(client);
                Ok(())
            }
            Err(e) => {
                let backoff_ms = state.backoff.failed();
                warn!(
                    target = %self.target,
                    error = %e,
                    backoff_ms,
                    "Failed to connect to PostgreSQL, will retry"
                );
                Err(e)
            }
        }
    }

    async fn open(&self) -> SinkResult<Client> {
        let connect_error = |source| SinkError::Connect {
            addr: self.target.clone(),
            source,
        };
        let (client, connection) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_postgres::connect(&self.config.url, NoTls),
        )
        .await
        .map_err(|_| {
            connect_error(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connection timed out",
            ))
        })?
        .map_err(|e| connect_error(std::io::Error::other(e)))?;

        // The connection future drives the socket; it ends when the client is
        // dropped or the server goes away.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection ended with error");
            }
        });
        Ok(client)
    }

    async fn insert(state: &mut PgState, series: &str, sql: &str, value: f64) -> SinkResult<u64> {
        let client = state.client.as_ref().ok_or_else(|| SinkError::Protocol {
            message: "connection missing".to_string(),
        })?;
        let statement = match state.statements.get(series) {
            Some(statement) => statement.clone(),
            None => {
                let statement = client.prepare(sql).await.map_err(database_error)?;
                state
                    .statements
                    .insert(series.to_string(), statement.clone());
                statement
            }
        };
        client
            .execute(&statement, &[&value])
            .await
            .map_err(database_error)
    }
}

/// Server-side statement errors are rejections; the rest are client errors.
fn database_error(e: tokio_postgres::Error) -> SinkError {
    match e.as_db_error() {
        Some(db) => SinkError::Rejected {
            message: format!("{}: {}", db.code().code(), db.message()),
        },
        None => SinkError::Postgres(e),
    }
}

#[async_trait]
impl MetricsSink for PostgresSink {
    async fn record(&self, series: &str, value: f64) -> SinkResult<()> {
        let sql = insert_statement(series)?;

        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await?;

        let io_timeout = self.config.io_timeout;
        let result =
            match tokio::time::timeout(io_timeout, Self::insert(&mut state, series, &sql, value))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout {
                    operation: "INSERT",
                    timeout_ms: u64::try_from(io_timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

        match result {
            Ok(rows) => {
                debug!(series, value, rows, "Sample inserted");
                Ok(())
            }
            Err(e) => {
                if e.breaks_connection() {
                    debug!(error = %e, "Dropping PostgreSQL connection");
                    state.disconnect();
                }
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
