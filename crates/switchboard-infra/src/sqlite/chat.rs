//! SQLite chat store implementation.
//!
//! Implements `ChatStore` from `switchboard-core`. Writes are keyed so that
//! replaying the same remote message is a no-op:
//! - chats on `(user_id, chat_id)`
//! - messages on `(user_id, protocol_message_id, chat_id)`

use chrono::Utc;
use sqlx::Row;

use switchboard_core::repository::ChatStore;
use switchboard_types::chat::{Direction, DomainChat, DomainMessage, WriteOutcome};
use switchboard_types::error::RepositoryError;
use switchboard_types::remote::{ChatKind, MediaKind};
use switchboard_types::user::UserId;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `ChatStore`.
pub struct SqliteChatStore {
    pool: DatabasePool,
}

impl SqliteChatStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatRow {
    user_id: String,
    chat_id: i64,
    kind: String,
    title: String,
    username: Option<String>,
    unread_count: Option<i64>,
    last_message_text: Option<String>,
    last_message_at: Option<String>,
    updated_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            chat_id: row.try_get("chat_id")?,
            kind: row.try_get("kind")?,
            title: row.try_get("title")?,
            username: row.try_get("username")?,
            unread_count: row.try_get("unread_count")?,
            last_message_text: row.try_get("last_message_text")?,
            last_message_at: row.try_get("last_message_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_chat(self) -> Result<DomainChat, RepositoryError> {
        let kind: ChatKind = self.kind.parse().map_err(RepositoryError::Query)?;
        Ok(DomainChat {
            user_id: UserId::new(self.user_id),
            chat_id: self.chat_id,
            kind,
            title: self.title,
            username: self.username,
            unread_count: self.unread_count.map(|n| n.clamp(0, u32::MAX as i64) as u32),
            last_message_text: self.last_message_text,
            last_message_at: self
                .last_message_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct MessageRow {
    user_id: String,
    chat_id: i64,
    protocol_message_id: i64,
    sender_id: Option<i64>,
    sender_name: Option<String>,
    text: String,
    media: Option<String>,
    direction: String,
    reply_to: Option<i64>,
    sent_at: String,
    edited_at: Option<String>,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            chat_id: row.try_get("chat_id")?,
            protocol_message_id: row.try_get("protocol_message_id")?,
            sender_id: row.try_get("sender_id")?,
            sender_name: row.try_get("sender_name")?,
            text: row.try_get("text")?,
            media: row.try_get("media")?,
            direction: row.try_get("direction")?,
            reply_to: row.try_get("reply_to")?,
            sent_at: row.try_get("sent_at")?,
            edited_at: row.try_get("edited_at")?,
        })
    }

    fn into_message(self) -> Result<DomainMessage, RepositoryError> {
        let media = self
            .media
            .as_deref()
            .map(str::parse::<MediaKind>)
            .transpose()
            .map_err(RepositoryError::Query)?;
        let direction: Direction = self.direction.parse().map_err(RepositoryError::Query)?;

        Ok(DomainMessage {
            user_id: UserId::new(self.user_id),
            chat_id: self.chat_id,
            protocol_message_id: self.protocol_message_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            text: self.text,
            media,
            direction,
            reply_to: self.reply_to,
            sent_at: parse_datetime(&self.sent_at)?,
            edited_at: self.edited_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

impl ChatStore for SqliteChatStore {
    async fn upsert_chat(&self, chat: &DomainChat) -> Result<(), RepositoryError> {
        // The preview only moves forward in time; absent optional fields keep
        // what is stored.
        sqlx::query(
            "INSERT INTO chats (user_id, chat_id, kind, title, username, unread_count, last_message_text, last_message_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, chat_id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                username = COALESCE(excluded.username, chats.username),
                unread_count = COALESCE(excluded.unread_count, chats.unread_count),
                last_message_text = CASE
                    WHEN excluded.last_message_at IS NOT NULL
                         AND (chats.last_message_at IS NULL OR excluded.last_message_at >= chats.last_message_at)
                    THEN excluded.last_message_text
                    ELSE chats.last_message_text END,
                last_message_at = CASE
                    WHEN excluded.last_message_at IS NOT NULL
                         AND (chats.last_message_at IS NULL OR excluded.last_message_at >= chats.last_message_at)
                    THEN excluded.last_message_at
                    ELSE chats.last_message_at END,
                updated_at = excluded.updated_at",
        )
        .bind(chat.user_id.as_str())
        .bind(chat.chat_id)
        .bind(chat.kind.to_string())
        .bind(&chat.title)
        .bind(&chat.username)
        .bind(chat.unread_count.map(i64::from))
        .bind(&chat.last_message_text)
        .bind(chat.last_message_at.as_ref().map(format_datetime))
        .bind(format_datetime(&chat.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn upsert_message(&self, message: &DomainMessage) -> Result<WriteOutcome, RepositoryError> {
        let media = message.media.map(|m| m.to_string());
        let edited_at = message.edited_at.as_ref().map(format_datetime);

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let existing = sqlx::query(
            "SELECT text, media, edited_at FROM messages
             WHERE user_id = ? AND protocol_message_id = ? AND chat_id = ?",
        )
        .bind(message.user_id.as_str())
        .bind(message.protocol_message_id)
        .bind(message.chat_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;

        let outcome = match existing {
            None => {
                sqlx::query(
                    "INSERT INTO messages (user_id, chat_id, protocol_message_id, sender_id, sender_name, text, media, direction, reply_to, sent_at, edited_at, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(message.user_id.as_str())
                .bind(message.chat_id)
                .bind(message.protocol_message_id)
                .bind(message.sender_id)
                .bind(&message.sender_name)
                .bind(&message.text)
                .bind(&media)
                .bind(message.direction.to_string())
                .bind(message.reply_to)
                .bind(format_datetime(&message.sent_at))
                .bind(&edited_at)
                .bind(format_datetime(&Utc::now()))
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
                WriteOutcome::Inserted
            }
            Some(row) => {
                let stored_text: String = row.try_get("text").map_err(query_error)?;
                let stored_media: Option<String> = row.try_get("media").map_err(query_error)?;
                let stored_edit: Option<String> = row.try_get("edited_at").map_err(query_error)?;

                if stored_text == message.text && stored_media == media && stored_edit == edited_at {
                    WriteOutcome::Unchanged
                } else {
                    sqlx::query(
                        "UPDATE messages
                         SET text = ?, media = ?, edited_at = ?,
                             sender_name = COALESCE(?, sender_name)
                         WHERE user_id = ? AND protocol_message_id = ? AND chat_id = ?",
                    )
                    .bind(&message.text)
                    .bind(&media)
                    .bind(&edited_at)
                    .bind(&message.sender_name)
                    .bind(message.user_id.as_str())
                    .bind(message.protocol_message_id)
                    .bind(message.chat_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(query_error)?;
                    WriteOutcome::Updated
                }
            }
        };

        tx.commit().await.map_err(query_error)?;
        Ok(outcome)
    }

    async fn list_chats(&self, user_id: &UserId, limit: u32) -> Result<Vec<DomainChat>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chats WHERE user_id = ?
             ORDER BY last_message_at IS NULL, last_message_at DESC, chat_id
             LIMIT ?",
        )
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| ChatRow::from_row(row).map_err(query_error)?.into_chat())
            .collect()
    }

    async fn list_messages(
        &self,
        user_id: &UserId,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<DomainMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM (
                SELECT * FROM messages WHERE user_id = ? AND chat_id = ?
                ORDER BY sent_at DESC, protocol_message_id DESC
                LIMIT ?
             ) ORDER BY sent_at ASC, protocol_message_id ASC",
        )
        .bind(user_id.as_str())
        .bind(chat_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| MessageRow::from_row(row).map_err(query_error)?.into_message())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta};

    use super::*;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn make_chat(chat_id: i64, last: Option<(&str, i64)>) -> DomainChat {
        DomainChat {
            user_id: UserId::new("u1"),
            chat_id,
            kind: ChatKind::Private,
            title: format!("Chat {chat_id}"),
            username: None,
            unread_count: None,
            last_message_text: last.map(|(text, _)| text.to_string()),
            last_message_at: last.map(|(_, secs)| at(secs)),
            updated_at: Utc::now(),
        }
    }

    fn make_message(chat_id: i64, id: i64, text: &str, secs: i64) -> DomainMessage {
        DomainMessage {
            user_id: UserId::new("u1"),
            chat_id,
            protocol_message_id: id,
            sender_id: Some(42),
            sender_name: Some("Bob".to_string()),
            text: text.to_string(),
            media: None,
            direction: Direction::Inbound,
            reply_to: None,
            sent_at: at(secs),
            edited_at: None,
        }
    }

    async fn store_with_chat(chat_id: i64) -> SqliteChatStore {
        let store = SqliteChatStore::new(test_pool().await);
        store.upsert_chat(&make_chat(chat_id, None)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_duplicate_message_is_stored_once() {
        let store = store_with_chat(10).await;
        let message = make_message(10, 1, "hi", 0);

        assert_eq!(store.upsert_message(&message).await.unwrap(), WriteOutcome::Inserted);
        assert_eq!(store.upsert_message(&message).await.unwrap(), WriteOutcome::Unchanged);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&store.pool.reader)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_same_id_in_other_chat_is_distinct() {
        let store = store_with_chat(10).await;
        store.upsert_chat(&make_chat(11, None)).await.unwrap();

        store.upsert_message(&make_message(10, 1, "a", 0)).await.unwrap();
        let outcome = store.upsert_message(&make_message(11, 1, "b", 0)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Inserted);
    }

    #[tokio::test]
    async fn test_edit_updates_message() {
        let store = store_with_chat(10).await;
        store.upsert_message(&make_message(10, 1, "hi", 0)).await.unwrap();

        let mut edited = make_message(10, 1, "hello", 0);
        edited.edited_at = Some(at(30));
        edited.sender_name = None;
        assert_eq!(store.upsert_message(&edited).await.unwrap(), WriteOutcome::Updated);

        let messages = store.list_messages(&UserId::new("u1"), 10, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[0].edited_at, Some(at(30)));
        assert_eq!(messages[0].sender_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn test_list_messages_returns_latest_in_order() {
        let store = store_with_chat(10).await;
        for i in 0..5 {
            store
                .upsert_message(&make_message(10, i, &format!("m{i}"), i))
                .await
                .unwrap();
        }

        let messages = store.list_messages(&UserId::new("u1"), 10, 3).await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_chat_preview_only_moves_forward() {
        let store = SqliteChatStore::new(test_pool().await);
        let user = UserId::new("u1");
        store.upsert_chat(&make_chat(10, Some(("newer", 100)))).await.unwrap();
        store.upsert_chat(&make_chat(10, Some(("older", 50)))).await.unwrap();

        let chats = store.list_chats(&user, 10).await.unwrap();
        assert_eq!(chats[0].last_message_text.as_deref(), Some("newer"));
        assert_eq!(chats[0].last_message_at, Some(at(100)));
    }

    #[tokio::test]
    async fn test_unread_count_kept_when_absent() {
        let store = SqliteChatStore::new(test_pool().await);
        let user = UserId::new("u1");
        let mut chat = make_chat(10, None);
        chat.unread_count = Some(4);
        store.upsert_chat(&chat).await.unwrap();
        store.upsert_chat(&make_chat(10, None)).await.unwrap();

        assert_eq!(store.list_chats(&user, 10).await.unwrap()[0].unread_count, Some(4));
    }

    #[tokio::test]
    async fn test_list_chats_orders_by_activity() {
        let store = SqliteChatStore::new(test_pool().await);
        let user = UserId::new("u1");
        store.upsert_chat(&make_chat(1, Some(("a", 10)))).await.unwrap();
        store.upsert_chat(&make_chat(2, None)).await.unwrap();
        store.upsert_chat(&make_chat(3, Some(("c", 30)))).await.unwrap();

        let ids: Vec<i64> = store
            .list_chats(&user, 10)
            .await
            .unwrap()
            .iter()
            .map(|c| c.chat_id)
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);

        assert_eq!(store.list_chats(&user, 1).await.unwrap().len(), 1);
        assert!(store.list_chats(&UserId::new("other"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_roundtrip_preserves_media_and_direction() {
        let store = store_with_chat(10).await;
        let mut message = make_message(10, 7, "", 0);
        message.media = Some(MediaKind::Voice);
        message.direction = Direction::Outgoing;
        message.reply_to = Some(6);
        store.upsert_message(&message).await.unwrap();

        let loaded = store.list_messages(&UserId::new("u1"), 10, 1).await.unwrap();
        assert_eq!(loaded[0], message);
        assert!(TimeDelta::zero() <= Utc::now() - loaded[0].sent_at);
    }
}
