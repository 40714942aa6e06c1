//! Chat-platform identifiers and the configured participant roster.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A chat-platform user id (Discord snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat-platform channel id (Discord snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user eligible to answer every round's question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    /// Name shown in the announcement.
    pub display_name: String,
}

impl Participant {
    pub fn new(id: u64, display_name: &str) -> Self {
        Self {
            id: UserId(id),
            display_name: display_name.to_string(),
        }
    }
}
