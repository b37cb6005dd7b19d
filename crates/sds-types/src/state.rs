//! Row lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Lifecycle tag stored on every row.
///
/// Rows start as `Unsent`. The caller picks the terminal state when a row
/// is published or filtered; there is no transition out of `Remove`, such
/// rows are meant to be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Waiting for transmission
    #[default]
    Unsent,
    /// Transmitted
    Sent,
    /// Transmitted and kept for local history
    Retain,
    /// Marked for deletion
    Remove,
    /// Handed to the transport, acknowledgement pending
    Published,
    /// Suppressed by change detection
    Ignore,
}

impl State {
    pub const ALL: [State; 6] = [
        State::Unsent,
        State::Sent,
        State::Retain,
        State::Remove,
        State::Published,
        State::Ignore,
    ];

    /// Persisted string form
    pub fn as_str(self) -> &'static str {
        match self {
            State::Unsent => "unsent",
            State::Sent => "sent",
            State::Retain => "retain",
            State::Remove => "remove",
            State::Published => "published",
            State::Ignore => "ignore",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| RegistryError::InvalidState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unsent() {
        assert_eq!(State::default(), State::Unsent);
    }

    #[test]
    fn test_parse_persisted_names() {
        for state in State::ALL {
            assert_eq!(state.as_str().parse::<State>().unwrap(), state);
        }
        assert!("".parse::<State>().is_err());
        assert!("SENT".parse::<State>().is_err());
    }
}
