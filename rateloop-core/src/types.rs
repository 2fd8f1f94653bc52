//! Strongly-typed identifiers for rateloop entities.

use std::fmt;

/// Identifier of a message, assigned by the producer in insertion order.
///
/// Ids start at zero and increase by one per produced message, so comparing
/// two ids compares their production order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// The first id handed out by a producer.
    pub const FIRST: Self = Self(0);

    /// Creates an id from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next id in sequence.
    ///
    /// # Panics
    /// Panics if the id would overflow.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        assert!(self.0 < u64::MAX, "ID overflow");
        Self(self.0 + 1)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<MessageId> for u64 {
    fn from(id: MessageId) -> Self {
        id.get()
    }
}
