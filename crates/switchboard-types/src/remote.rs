//! Records exchanged with the remote messaging capability.
//!
//! These mirror what a protocol client hands back (messages, chats, peers,
//! dialogs, inbound events) without committing to any wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::session::ApiCredentials;
use crate::user::UserId;

/// Everything a connector needs to build a session for one user.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub user_id: UserId,
    pub credentials: ApiCredentials,
    /// Empty for a fresh handshake, otherwise a previously exported blob.
    pub session_blob: String,
}

/// Where the remote handshake stands after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// A login code was delivered to the user's other devices or via SMS.
    CodeSent,
    /// The code was accepted but the account has a second-factor password.
    PasswordRequired { hint: Option<String> },
    /// The session is logged in.
    Authorized,
}

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatKind::Private => write!(f, "private"),
            ChatKind::Group => write!(f, "group"),
            ChatKind::Channel => write!(f, "channel"),
        }
    }
}

impl FromStr for ChatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(ChatKind::Private),
            "group" => Ok(ChatKind::Group),
            "channel" => Ok(ChatKind::Channel),
            other => Err(format!("invalid chat kind: '{other}'")),
        }
    }
}

/// Attachment carried by a message, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Voice,
    Document,
    Sticker,
    Animation,
    Location,
    Contact,
    Poll,
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
            MediaKind::Animation => "animation",
            MediaKind::Location => "location",
            MediaKind::Contact => "contact",
            MediaKind::Poll => "poll",
            MediaKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "photo" => Ok(MediaKind::Photo),
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "voice" => Ok(MediaKind::Voice),
            "document" => Ok(MediaKind::Document),
            "sticker" => Ok(MediaKind::Sticker),
            "animation" => Ok(MediaKind::Animation),
            "location" => Ok(MediaKind::Location),
            "contact" => Ok(MediaKind::Contact),
            "poll" => Ok(MediaKind::Poll),
            "other" => Ok(MediaKind::Other),
            other => Err(format!("invalid media kind: '{other}'")),
        }
    }
}

/// A conversation as the remote side describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChat {
    pub id: i64,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub username: Option<String>,
}

/// A remote user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePeer {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl RemotePeer {
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            full
        } else if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            format!("@{username}")
        } else {
            self.id.to_string()
        }
    }
}

/// A single message as delivered by the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    /// Protocol message id; unique within a chat.
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub text: String,
    pub media: Option<MediaKind>,
    /// Sent by the session's own account.
    pub outgoing: bool,
    pub date: DateTime<Utc>,
    pub edit_date: Option<DateTime<Utc>>,
    pub reply_to: Option<i64>,
}

/// An entry of the account's conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDialog {
    pub chat: RemoteChat,
    pub top_message: Option<RemoteMessage>,
    pub unread_count: u32,
}

/// Inbound event emitted by a live remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    NewMessage(RemoteMessage),
    MessageEdited(RemoteMessage),
    /// Transport dropped; the session is no longer usable.
    ConnectionLost { reason: String },
    /// The remote side revoked the session's authorization.
    Unauthorized,
}

/// Options for an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    pub reply_to: Option<i64>,
    /// Deliver without a notification sound.
    pub silent: bool,
    pub disable_link_preview: bool,
}
