//! rateloop core - messages, identifiers and control parameters.
//!
//! This crate holds the plain data shared by every role of the simulation:
//! the [`Message`] type and its factory, the [`MessageId`] newtype, and the
//! startup [`ControlParameters`]. It has no async or synchronization code;
//! that lives in `rateloop-flow` and `rateloop-runtime`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod message;
mod params;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use message::{random_payload, Message, MessageFactory, MESSAGE_LENGTH, PAYLOAD_LEN};
pub use params::{
    secs_to_duration, ControlParameters, ControlParametersBuilder, DEFAULT_CAPACITY,
    DEFAULT_CONSUMPTION_DELAY_SECS,
};
pub use types::MessageId;
