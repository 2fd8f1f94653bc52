//! Occupancy observers for tests.

use std::sync::{Mutex, PoisonError};

use rateloop_runtime::OccupancyObserver;

/// Records every `(occupancy, capacity)` pair it is handed.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    samples: Mutex<Vec<(usize, usize)>>,
}

impl RecordingObserver {
    /// Creates an empty observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<(usize, usize)> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of removals observed.
    #[must_use]
    pub fn count(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if every sample had `occupancy < capacity`.
    ///
    /// A removal always leaves at least one free slot.
    #[must_use]
    pub fn all_within_bounds(&self) -> bool {
        self.samples()
            .iter()
            .all(|&(occupancy, capacity)| occupancy < capacity)
    }
}

impl OccupancyObserver for RecordingObserver {
    fn on_removal(&self, occupancy: usize, capacity: usize) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((occupancy, capacity));
    }
}
