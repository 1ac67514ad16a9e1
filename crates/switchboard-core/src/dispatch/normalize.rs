//! Conversion of remote records into stored domain records.

use chrono::{DateTime, Utc};

use switchboard_types::chat::{Direction, DomainChat, DomainMessage};
use switchboard_types::remote::{ChatKind, RemoteChat, RemoteDialog, RemoteMessage};
use switchboard_types::user::UserId;

/// Title shown for a chat: its title, else `@username`, else the numeric id.
pub fn chat_title(chat: &RemoteChat) -> String {
    if let Some(title) = chat.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    match chat.username.as_deref().filter(|u| !u.is_empty()) {
        Some(username) => format!("@{username}"),
        None => chat.id.to_string(),
    }
}

/// Placeholder used when a chat cannot be resolved. Negative ids are
/// multi-member conversations on the remote network.
pub fn unresolved_chat(chat_id: i64) -> RemoteChat {
    RemoteChat {
        id: chat_id,
        kind: if chat_id < 0 {
            ChatKind::Group
        } else {
            ChatKind::Private
        },
        title: None,
        username: None,
    }
}

pub fn message_from_remote(
    user_id: &UserId,
    message: &RemoteMessage,
    sender_name: Option<String>,
) -> DomainMessage {
    DomainMessage {
        user_id: user_id.clone(),
        chat_id: message.chat_id,
        protocol_message_id: message.id,
        sender_id: message.sender_id,
        sender_name,
        text: message.text.clone(),
        media: message.media,
        direction: if message.outgoing {
            Direction::Outgoing
        } else {
            Direction::Inbound
        },
        reply_to: message.reply_to,
        sent_at: message.date,
        edited_at: message.edit_date,
    }
}

/// Chat row carrying `last` as its latest message preview.
pub fn chat_from_remote(
    user_id: &UserId,
    chat: &RemoteChat,
    last: Option<&DomainMessage>,
    unread_count: Option<u32>,
    now: DateTime<Utc>,
) -> DomainChat {
    DomainChat {
        user_id: user_id.clone(),
        chat_id: chat.id,
        kind: chat.kind,
        title: chat_title(chat),
        username: chat.username.clone(),
        unread_count,
        last_message_text: last.map(DomainMessage::preview),
        last_message_at: last.map(|m| m.sent_at),
        updated_at: now,
    }
}

/// Chat row and optional top message for one dialog entry.
pub fn chat_from_dialog(
    user_id: &UserId,
    dialog: &RemoteDialog,
    own_name: &str,
    now: DateTime<Utc>,
) -> (DomainChat, Option<DomainMessage>) {
    let top = dialog.top_message.as_ref().map(|m| {
        let sender_name = m.outgoing.then(|| own_name.to_string());
        message_from_remote(user_id, m, sender_name)
    });
    let chat = chat_from_remote(
        user_id,
        &dialog.chat,
        top.as_ref(),
        Some(dialog.unread_count),
        now,
    );
    (chat, top)
}
