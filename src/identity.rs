//! Identifiers and durable participant identities
//!
//! Every stored entity (room, member, session, participant, answer, quiz,
//! question, option) is addressed by an [`Id`]. People are addressed by an
//! [`Identity`]: the opaque handle that survives reconnects, either a web
//! reconnect token or a Telegram user id.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

/// A unique identifier for any entity in the system
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    /// Creates a new random ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    /// Parses an ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The durable identity of a person taking part in a room
///
/// Identities are compared for equality only; the core never interprets
/// their contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// A reconnect token held by a web client
    Web(String),
    /// A Telegram user id
    Telegram(i64),
}

impl Identity {
    /// Returns the Telegram user id if this identity belongs to a bot user
    pub fn telegram_id(&self) -> Option<i64> {
        match self {
            Self::Telegram(id) => Some(*id),
            Self::Web(_) => None,
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Web(_) => write!(f, "web"),
            Self::Telegram(id) => write!(f, "telegram:{id}"),
        }
    }
}
