//! Normalized chat and message records.
//!
//! These are what Switchboard writes to the chat store and publishes to a
//! user's delivery room. A message is identified by
//! `(user_id, protocol_message_id, chat_id)`, which makes repeated delivery
//! of the same remote message safe to store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::remote::{ChatKind, MediaKind};
use crate::user::UserId;

/// Which way a message travelled relative to the session's account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outgoing,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outgoing => write!(f, "outgoing"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inbound" => Ok(Direction::Inbound),
            "outgoing" => Ok(Direction::Outgoing),
            other => Err(format!("invalid direction: '{other}'")),
        }
    }
}

/// A conversation row owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainChat {
    pub user_id: UserId,
    pub chat_id: i64,
    pub kind: ChatKind,
    pub title: String,
    pub username: Option<String>,
    /// `None` when the source did not report it; stores keep the old value.
    pub unread_count: Option<u32>,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A message row owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMessage {
    pub user_id: UserId,
    pub chat_id: i64,
    pub protocol_message_id: i64,
    pub sender_id: Option<i64>,
    pub sender_name: Option<String>,
    pub text: String,
    pub media: Option<MediaKind>,
    pub direction: Direction,
    pub reply_to: Option<i64>,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl DomainMessage {
    /// Short text for chat list previews.
    pub fn preview(&self) -> String {
        if !self.text.is_empty() {
            return self.text.chars().take(120).collect();
        }
        match self.media {
            Some(media) => format!("[{media}]"),
            None => String::new(),
        }
    }
}

/// Result of an idempotent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    /// The row already existed with identical content.
    Unchanged,
}

impl WriteOutcome {
    pub fn is_changed(&self) -> bool {
        !matches!(self, WriteOutcome::Unchanged)
    }
}
