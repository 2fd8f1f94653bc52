//! Messages carried through the bounded queue.
//!
//! A message is an id plus a short random alphanumeric payload. Messages are
//! immutable once built; the queue owns a message between insertion and
//! removal and hands it to the consumer by value.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::MessageId;

/// Length of a message buffer, counting one terminator slot.
pub const MESSAGE_LENGTH: usize = 17;

/// Number of payload characters in every message.
pub const PAYLOAD_LEN: usize = MESSAGE_LENGTH - 1;

/// An immutable message produced by the producer.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    payload: String,
}

impl Message {
    /// Creates a message with an explicit payload.
    #[must_use]
    pub fn new(id: MessageId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Returns the message id.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({} {})", self.id, self.payload)
    }
}

/// Builds messages with sequential ids and random payloads.
///
/// Ids start at [`MessageId::FIRST`] and are assigned in the order
/// [`next_message`](Self::next_message) is called, so a single factory per
/// producer yields ids matching insertion order.
#[derive(Debug)]
pub struct MessageFactory<R = StdRng> {
    next_id: MessageId,
    rng: R,
}

impl MessageFactory<StdRng> {
    /// Creates a factory seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a factory with a fixed seed (for reproducible tests).
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> MessageFactory<R> {
    /// Creates a factory using the given RNG.
    #[must_use]
    pub fn with_rng(rng: R) -> Self {
        Self {
            next_id: MessageId::FIRST,
            rng,
        }
    }

    /// Builds the next message.
    pub fn next_message(&mut self) -> Message {
        let id = self.next_id;
        self.next_id = id.next();
        Message {
            id,
            payload: random_payload(&mut self.rng),
        }
    }
}

/// Draws a payload of [`PAYLOAD_LEN`] characters, each chosen uniformly from
/// `[a-zA-Z0-9]`.
pub fn random_payload<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PAYLOAD_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}
