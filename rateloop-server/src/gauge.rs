//! Console rendering of queue occupancy.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use rateloop_runtime::OccupancyObserver;
use tracing::debug;

/// Renders occupancy as `Front -> ■ ■ - - <- Rear`.
///
/// One `■` per queued message and one `-` per free slot. Occupancy above
/// `capacity` is clamped.
#[must_use]
pub fn render_gauge(occupancy: usize, capacity: usize) -> String {
    let filled = occupancy.min(capacity);
    let mut line = String::with_capacity(capacity * 4 + 20);
    line.push_str("Front -> ");
    for slot in 0..capacity {
        line.push_str(if slot < filled { "■ " } else { "- " });
    }
    line.push_str("<- Rear");
    line
}

/// Observer printing a gauge line after every removal.
#[derive(Debug)]
pub struct QueueGauge<W> {
    out: Mutex<W>,
}

impl QueueGauge<io::Stdout> {
    /// Creates a gauge writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> QueueGauge<W> {
    /// Creates a gauge writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> OccupancyObserver for QueueGauge<W> {
    fn on_removal(&self, occupancy: usize, capacity: usize) {
        let line = render_gauge(occupancy, capacity);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "Message Queue State:\n{line}").and_then(|()| out.flush()) {
            debug!(error = %e, "Failed to write queue gauge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_gauge() {
        assert_eq!(render_gauge(2, 4), "Front -> ■ ■ - - <- Rear");
        assert_eq!(render_gauge(0, 3), "Front -> - - - <- Rear");
        assert_eq!(render_gauge(3, 3), "Front -> ■ ■ ■ <- Rear");
    }

    #[test]
    fn test_render_gauge_clamps() {
        assert_eq!(render_gauge(5, 2), "Front -> ■ ■ <- Rear");
    }

    #[test]
    fn test_gauge_writes_each_removal() {
        let gauge = QueueGauge::new(Vec::new());
        gauge.on_removal(1, 2);
        gauge.on_removal(0, 2);

        let output = String::from_utf8(gauge.into_inner()).unwrap();
        assert_eq!(
            output,
            "Message Queue State:\nFront -> ■ - <- Rear\nMessage Queue State:\nFront -> - - <- Rear\n"
        );
    }
}
