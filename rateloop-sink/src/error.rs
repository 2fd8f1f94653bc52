//! Sink error types.

use thiserror::Error;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that can occur while recording a sample.
///
/// None of these are fatal to the simulation; callers log and count them.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to connect to the backend.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// The backend address.
        addr: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The backend is in reconnect backoff; no attempt was made.
    #[error("backend at {addr} unavailable, retrying in {retry_in_ms}ms")]
    Unavailable {
        /// The backend address.
        addr: String,
        /// Time left before the next connection attempt.
        retry_in_ms: u64,
    },

    /// An operation on an established connection timed out.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// What was being performed.
        operation: &'static str,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend sent something that is not a valid reply.
    #[error("protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },

    /// The backend rejected the write.
    #[error("write rejected: {message}")]
    Rejected {
        /// Error text returned by the backend.
        message: String,
    },

    /// Database client error other than a rejected statement.
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// The series name cannot be used as a table name.
    #[error("series {series:?} is not a valid table name")]
    InvalidSeries {
        /// The offending series.
        series: String,
    },

    /// Simulated failure from a fault-injecting sink.
    #[error("injected failure recording to {series}")]
    Injected {
        /// The series being written.
        series: String,
    },
}

impl SinkError {
    /// Returns whether the connection that produced this error must be
    /// discarded before the next write.
    #[must_use]
    pub fn breaks_connection(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout { .. } | Self::Protocol { .. } => true,
            Self::Postgres(e) => e.is_closed(),
            _ => false,
        }
    }
}
