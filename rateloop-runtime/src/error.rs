//! Runtime error types.

use rateloop_core::ConfigError;
use rateloop_flow::FlowError;
use thiserror::Error;

use crate::role::Role;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised while building or running a simulation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Invalid startup parameters.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Flow control setup or protocol failure.
    #[error("flow control error: {0}")]
    Flow(#[from] FlowError),

    /// A role task panicked or was aborted.
    #[error("{role} task failed: {message}")]
    TaskFailed {
        /// The role whose task failed.
        role: Role,
        /// Description of the failure.
        message: String,
    },

    /// Roles did not stop within the shutdown timeout.
    #[error("shutdown timed out after {timeout_ms}ms")]
    ShutdownTimeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
}
