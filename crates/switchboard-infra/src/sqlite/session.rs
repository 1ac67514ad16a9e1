//! SQLite session store implementation.
//!
//! Implements `SessionStore` from `switchboard-core`. One row per user in
//! `remote_sessions`; the blob column is written and read back untouched.

use chrono::{DateTime, Utc};
use sqlx::Row;

use switchboard_core::repository::SessionStore;
use switchboard_types::error::RepositoryError;
use switchboard_types::session::PersistedSession;
use switchboard_types::user::UserId;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `SessionStore`.
pub struct SqliteSessionStore {
    pool: DatabasePool,
}

impl SqliteSessionStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to `PersistedSession`.
struct SessionRow {
    user_id: String,
    session_blob: String,
    api_id: Option<i32>,
    api_hash: Option<String>,
    phone: Option<String>,
    remote_user_id: Option<i64>,
    remote_username: Option<String>,
    remote_first_name: Option<String>,
    remote_last_name: Option<String>,
    is_connected: bool,
    last_connected_at: Option<String>,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            session_blob: row.try_get("session_blob")?,
            api_id: row.try_get("api_id")?,
            api_hash: row.try_get("api_hash")?,
            phone: row.try_get("phone")?,
            remote_user_id: row.try_get("remote_user_id")?,
            remote_username: row.try_get("remote_username")?,
            remote_first_name: row.try_get("remote_first_name")?,
            remote_last_name: row.try_get("remote_last_name")?,
            is_connected: row.try_get("is_connected")?,
            last_connected_at: row.try_get("last_connected_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<PersistedSession, RepositoryError> {
        Ok(PersistedSession {
            user_id: UserId::new(self.user_id),
            session_blob: self.session_blob,
            api_id: self.api_id,
            api_hash: self.api_hash,
            phone: self.phone,
            remote_user_id: self.remote_user_id,
            remote_username: self.remote_username,
            remote_first_name: self.remote_first_name,
            remote_last_name: self.remote_last_name,
            is_connected: self.is_connected,
            last_connected_at: self
                .last_connected_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn map_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<PersistedSession>, RepositoryError> {
    rows.iter()
        .map(|row| SessionRow::from_row(row).map_err(query_error)?.into_session())
        .collect()
}

impl SessionStore for SqliteSessionStore {
    async fn load(&self, user_id: &UserId) -> Result<Option<PersistedSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM remote_sessions WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                SessionRow::from_row(&row).map_err(query_error)?.into_session()?,
            )),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO remote_sessions (user_id, session_blob, api_id, api_hash, phone, remote_user_id, remote_username, remote_first_name, remote_last_name, is_connected, last_connected_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                session_blob = excluded.session_blob,
                api_id = excluded.api_id,
                api_hash = excluded.api_hash,
                phone = excluded.phone,
                remote_user_id = excluded.remote_user_id,
                remote_username = excluded.remote_username,
                remote_first_name = excluded.remote_first_name,
                remote_last_name = excluded.remote_last_name,
                is_connected = excluded.is_connected,
                last_connected_at = excluded.last_connected_at,
                updated_at = excluded.updated_at",
        )
        .bind(session.user_id.as_str())
        .bind(&session.session_blob)
        .bind(session.api_id)
        .bind(&session.api_hash)
        .bind(&session.phone)
        .bind(session.remote_user_id)
        .bind(&session.remote_username)
        .bind(&session.remote_first_name)
        .bind(&session.remote_last_name)
        .bind(session.is_connected)
        .bind(session.last_connected_at.as_ref().map(format_datetime))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn mark_connected(
        &self,
        user_id: &UserId,
        connected: bool,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let at = format_datetime(&at);
        sqlx::query(
            "UPDATE remote_sessions
             SET is_connected = ?1,
                 last_connected_at = CASE WHEN ?1 THEN ?2 ELSE last_connected_at END,
                 updated_at = ?2
             WHERE user_id = ?3",
        )
        .bind(connected)
        .bind(&at)
        .bind(user_id.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn list_connectable(&self) -> Result<Vec<PersistedSession>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM remote_sessions
             WHERE is_connected = 1 AND TRIM(session_blob) != ''
             ORDER BY user_id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        map_rows(rows)
    }

    async fn list_all(&self) -> Result<Vec<PersistedSession>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM remote_sessions ORDER BY updated_at DESC, user_id")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        map_rows(rows)
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM remote_sessions WHERE user_id = ?")
            .bind(user_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}
