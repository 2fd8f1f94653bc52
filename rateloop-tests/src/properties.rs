//! Property definitions and checkers for rateloop tests.
//!
//! Properties are invariants that must hold in every reachable state of a
//! simulation. The checker is fed insert/remove events (from roles, or from
//! a test driving the flow controller directly) and collects violations
//! instead of panicking, so a test can report all of them at once.

use std::collections::{BTreeSet, VecDeque};

use rateloop_core::{Message, MessageId};
use rateloop_flow::{Adjustment, DelayUpdate, FlowController};

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a queue or controller property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyViolation {
    /// Occupancy outside `0..=capacity`.
    OccupancyOutOfBounds {
        /// Observed occupancy.
        occupancy: usize,
        /// Queue capacity.
        capacity: usize,
    },
    /// A removal returned something other than the oldest queued message.
    OutOfOrder {
        /// Id that should have been removed.
        expected: Option<MessageId>,
        /// Id that was removed.
        actual: MessageId,
    },
    /// The same id was inserted twice.
    DuplicateInsert {
        /// The repeated id.
        id: MessageId,
    },
    /// An id was removed that was never inserted, or removed twice.
    PhantomRemove {
        /// The unexpected id.
        id: MessageId,
    },
    /// Inserted messages are neither removed nor still queued.
    Lost {
        /// Ids that disappeared.
        ids: Vec<MessageId>,
    },
    /// Free-slot and item permits do not match occupancy at rest.
    PermitMismatch {
        /// Observed occupancy.
        occupancy: usize,
        /// Free-slot permits available.
        slots: usize,
        /// Item permits available.
        items: usize,
        /// Queue capacity.
        capacity: usize,
    },
    /// A controller tick moved the delay the wrong way.
    WrongDirection {
        /// The offending update.
        update: DelayUpdate,
        /// Target occupancy.
        threshold: usize,
    },
    /// A decrease went under the floor from a delay above it.
    BelowFloor {
        /// The offending update.
        update: DelayUpdate,
        /// Configured floor in seconds.
        floor_secs: f64,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OccupancyOutOfBounds {
                occupancy,
                capacity,
            } => write!(f, "Occupancy {occupancy} outside 0..={capacity}"),
            Self::OutOfOrder { expected, actual } => {
                write!(f, "Removed {actual}, expected {expected:?}")
            }
            Self::DuplicateInsert { id } => write!(f, "Message {id} inserted twice"),
            Self::PhantomRemove { id } => {
                write!(f, "Message {id} removed but not queued")
            }
            Self::Lost { ids } => write!(f, "Messages lost: {ids:?}"),
            Self::PermitMismatch {
                occupancy,
                slots,
                items,
                capacity,
            } => write!(
                f,
                "Permits out of sync: occupancy {occupancy}, {slots} slots + {items} items \
                 for capacity {capacity}"
            ),
            Self::WrongDirection { update, threshold } => write!(
                f,
                "Delay moved {:.6} -> {:.6} at occupancy {} (threshold {threshold})",
                update.previous_secs, update.current_secs, update.occupancy
            ),
            Self::BelowFloor { update, floor_secs } => write!(
                f,
                "Delay decreased {:.6} -> {:.6}, under floor {floor_secs}",
                update.previous_secs, update.current_secs
            ),
        }
    }
}

// ============================================================================
// Queue Property Checker
// ============================================================================

/// Tracks inserts and removals and checks queue invariants.
#[derive(Debug)]
pub struct PropertyChecker {
    capacity: usize,
    /// Ids currently believed to be queued, oldest first.
    queued: VecDeque<MessageId>,
    inserted: BTreeSet<MessageId>,
    removed: BTreeSet<MessageId>,
    violations: Vec<PropertyViolation>,
}

impl PropertyChecker {
    /// Creates a checker for a queue of `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queued: VecDeque::new(),
            inserted: BTreeSet::new(),
            removed: BTreeSet::new(),
            violations: Vec::new(),
        }
    }

    /// Records an insert and the occupancy right after it.
    pub fn record_insert(&mut self, id: MessageId, occupancy: usize) {
        if !self.inserted.insert(id) {
            self.violations.push(PropertyViolation::DuplicateInsert { id });
        }
        self.queued.push_back(id);
        self.check_occupancy(occupancy);
    }

    /// Records a removal and the occupancy right after it.
    pub fn record_remove(&mut self, id: MessageId, occupancy: usize) {
        if !self.inserted.contains(&id) || !self.removed.insert(id) {
            self.violations.push(PropertyViolation::PhantomRemove { id });
        }
        let expected = self.queued.pop_front();
        if expected != Some(id) {
            self.violations
                .push(PropertyViolation::OutOfOrder { expected, actual: id });
        }
        self.check_occupancy(occupancy);
    }

    /// Checks an occupancy sample against the bounds.
    pub fn check_occupancy(&mut self, occupancy: usize) {
        if occupancy > self.capacity {
            self.violations.push(PropertyViolation::OccupancyOutOfBounds {
                occupancy,
                capacity: self.capacity,
            });
        }
    }

    /// Checks that every inserted id was removed or is in `still_queued`.
    pub fn check_accounted(&mut self, still_queued: &[MessageId]) {
        let remaining: BTreeSet<MessageId> = still_queued.iter().copied().collect();
        let lost: Vec<MessageId> = self
            .inserted
            .iter()
            .filter(|id| !self.removed.contains(*id) && !remaining.contains(*id))
            .copied()
            .collect();
        if !lost.is_empty() {
            self.violations.push(PropertyViolation::Lost { ids: lost });
        }
    }

    /// Returns the number of inserts recorded.
    #[must_use]
    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }

    /// Returns the number of removals recorded.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    /// Returns all violations found.
    #[must_use]
    pub fn violations(&self) -> &[PropertyViolation] {
        &self.violations
    }

    /// Returns true if no violations were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Panics with every violation if any were found.
    ///
    /// # Panics
    ///
    /// Panics if a property was violated.
    pub fn assert_valid(&self) {
        assert!(
            self.is_valid(),
            "property violations:\n{}",
            self.violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        );
    }
}

// ============================================================================
// Standalone Checks
// ============================================================================

/// Checks that permits match occupancy while no guard is held.
///
/// At rest every queued message owns one item permit and every free slot
/// owns one slot permit.
pub async fn check_permits_at_rest(flow: &FlowController<Message>) -> Option<PropertyViolation> {
    let occupancy = flow.occupancy().await;
    let slots = flow.available_slots();
    let items = flow.available_items();
    let capacity = flow.capacity();
    if items == occupancy && slots + occupancy == capacity {
        None
    } else {
        Some(PropertyViolation::PermitMismatch {
            occupancy,
            slots,
            items,
            capacity,
        })
    }
}

/// Returns the ids queued in `flow`, front first.
pub async fn queued_ids(flow: &FlowController<Message>) -> Vec<MessageId> {
    flow.lock()
        .await
        .queue()
        .iter()
        .map(Message::id)
        .collect()
}

/// Checks one controller tick against the direction and floor rules.
#[must_use]
pub fn check_delay_update(
    update: &DelayUpdate,
    threshold: usize,
    floor_secs: f64,
) -> Option<PropertyViolation> {
    let direction_ok = match update.adjustment {
        Adjustment::SpeedUp => {
            update.occupancy < threshold && update.current_secs <= update.previous_secs
        }
        Adjustment::SlowDown => {
            update.occupancy > threshold && update.current_secs > update.previous_secs
        }
        Adjustment::Hold => {
            update.occupancy == threshold
                && update.current_secs.to_bits() == update.previous_secs.to_bits()
        }
    };
    if !direction_ok {
        return Some(PropertyViolation::WrongDirection {
            update: *update,
            threshold,
        });
    }
    if update.adjustment == Adjustment::SpeedUp
        && update.previous_secs >= floor_secs
        && update.current_secs < floor_secs
    {
        return Some(PropertyViolation::BelowFloor {
            update: *update,
            floor_secs,
        });
    }
    None
}
