//! SessionStore trait definition.

use chrono::{DateTime, Utc};
use switchboard_types::error::RepositoryError;
use switchboard_types::session::PersistedSession;
use switchboard_types::user::UserId;

/// Persistence of one durable session row per user.
///
/// No business logic lives behind this trait; failures are I/O errors that
/// callers propagate unchanged. Implementations live in switchboard-infra
/// (e.g., `SqliteSessionStore`).
pub trait SessionStore: Send + Sync {
    /// Load the session row for a user.
    fn load(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<PersistedSession>, RepositoryError>> + Send;

    /// Insert or replace the row for `session.user_id`.
    fn save(
        &self,
        session: &PersistedSession,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Set the connected flag. When `connected` is true, `last_connected_at`
    /// becomes `at`. A missing row is a no-op.
    fn mark_connected(
        &self,
        user_id: &UserId,
        connected: bool,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All rows with a non-empty blob and the connected flag set.
    fn list_connectable(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<PersistedSession>, RepositoryError>> + Send;

    /// Every stored row, most recently updated first.
    fn list_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<PersistedSession>, RepositoryError>> + Send;

    /// Delete a user's row. Returns whether a row existed.
    fn delete(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
