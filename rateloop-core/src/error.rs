//! Configuration error types.

/// The result type for parameter validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised while validating startup parameters.
///
/// Every variant is fatal: it is reported before any role starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A required parameter was not supplied.
    #[error("missing required parameter: {name}")]
    Missing {
        /// The parameter name.
        name: &'static str,
    },

    /// A parameter was supplied with an unusable value.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// The parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an `Invalid` error.
    #[must_use]
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}
