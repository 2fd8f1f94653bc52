//! Flow control error types.

/// Flow control error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// Queue is full.
    ///
    /// Only reachable by using [`BoundedQueue`](crate::BoundedQueue)
    /// directly; the permit protocol never lets an insert see a full queue.
    #[error("queue full: {size} items (max {max_size})")]
    QueueFull {
        /// Current queue size.
        size: usize,
        /// Maximum queue size.
        max_size: usize,
    },

    /// Queue is empty.
    #[error("queue empty")]
    QueueEmpty,

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// The queue's backing storage could not be allocated.
    #[error("failed to allocate queue storage for {capacity} messages")]
    AllocationFailed {
        /// Requested capacity.
        capacity: usize,
    },

    /// A guard's permit was already spent on an earlier push or pop.
    #[error("permit already consumed by this guard")]
    PermitConsumed,

    /// The flow controller was closed while waiting for a permit.
    #[error("flow controller closed")]
    Closed,
}

/// Result type for flow control operations.
pub type FlowResult<T> = Result<T, FlowError>;
