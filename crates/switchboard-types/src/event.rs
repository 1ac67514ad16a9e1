//! Events published to a user's delivery room.
//!
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.
//! Serialized as `{"event": "<name>", "payload": {...}}`.

use serde::{Deserialize, Serialize};

use crate::chat::{DomainChat, DomainMessage};

/// Real-time notification for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum DeliveryEvent {
    /// A message was stored (new, or changed by an edit).
    NewMessage {
        message: DomainMessage,
        chat: DomainChat,
    },

    /// A chat's preview, title, or counters changed.
    ChatUpdated { chat: DomainChat },

    /// The user's remote session is no longer authorized and must be
    /// re-verified.
    AuthFailed { reason: String },
}

impl DeliveryEvent {
    pub const NEW_MESSAGE: &'static str = "new-message";
    pub const CHAT_UPDATED: &'static str = "chat-updated";
    pub const AUTH_FAILED: &'static str = "auth-failed";

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryEvent::NewMessage { .. } => Self::NEW_MESSAGE,
            DeliveryEvent::ChatUpdated { .. } => Self::CHAT_UPDATED,
            DeliveryEvent::AuthFailed { .. } => Self::AUTH_FAILED,
        }
    }
}
