//! ChatStore trait definition.
//!
//! Writes are idempotent: chats are keyed by `(user_id, chat_id)` and
//! messages by `(user_id, protocol_message_id, chat_id)`, so replaying an
//! inbound event never produces a second row.

use switchboard_types::chat::{DomainChat, DomainMessage, WriteOutcome};
use switchboard_types::error::RepositoryError;
use switchboard_types::user::UserId;

/// Repository trait for normalized chat and message rows.
pub trait ChatStore: Send + Sync {
    /// Insert or update a chat. Optional fields that are `None` keep the
    /// stored value, and `last_message_*` only moves forward in time.
    fn upsert_chat(
        &self,
        chat: &DomainChat,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert a message, or update its text/media/edit time if it already
    /// exists with different content.
    fn upsert_message(
        &self,
        message: &DomainMessage,
    ) -> impl std::future::Future<Output = Result<WriteOutcome, RepositoryError>> + Send;

    /// Chats for a user, most recent activity first.
    fn list_chats(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<DomainChat>, RepositoryError>> + Send;

    /// The latest `limit` messages of a chat in chronological order.
    fn list_messages(
        &self,
        user_id: &UserId,
        chat_id: i64,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<DomainMessage>, RepositoryError>> + Send;
}
