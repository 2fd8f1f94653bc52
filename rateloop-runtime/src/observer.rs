//! Hook for rendering queue occupancy.

/// Receives the queue occupancy after every removal.
///
/// Called by the consumer while it still holds the queue lock, so the values
/// are consistent with each other. Implementations should return quickly.
pub trait OccupancyObserver: Send + Sync {
    /// Called after a message has been removed.
    fn on_removal(&self, occupancy: usize, capacity: usize);
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl OccupancyObserver for NoopObserver {
    fn on_removal(&self, _occupancy: usize, _capacity: usize) {}
}
