//! Role names.

use std::fmt;

/// The three concurrent roles of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Inserts messages at the production delay.
    Producer,
    /// Removes messages at the consumption delay.
    Consumer,
    /// Rewrites the production delay once per period.
    Controller,
}

impl Role {
    /// Returns the role name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::Controller => "controller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
