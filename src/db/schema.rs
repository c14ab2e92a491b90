//! Database schema and types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient TEXT NOT NULL,
    sender TEXT NOT NULL,
    message_text TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('incoming', 'outgoing'))
);

CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages(recipient);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp DESC, id DESC);
";

/// Which way a message travelled relative to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored message record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub recipient: String,
    pub sender: String,
    pub message_text: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
}

/// A message that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub recipient: String,
    pub sender: String,
    pub message_text: String,
    pub direction: Direction,
}

impl NewMessage {
    /// Message from a chat user to the service number
    pub fn incoming(
        user: impl Into<String>,
        service: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            recipient: service.into(),
            sender: user.into(),
            message_text: text.into(),
            direction: Direction::Incoming,
        }
    }

    /// Reply from the service number to a chat user
    pub fn outgoing(
        user: impl Into<String>,
        service: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            recipient: user.into(),
            sender: service.into(),
            message_text: text.into(),
            direction: Direction::Outgoing,
        }
    }
}
