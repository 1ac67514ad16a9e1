//! Registry of live remote sessions.
//!
//! Membership here is the one definition of "connected": every operation
//! that needs a usable session looks it up in this registry and nowhere else.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use switchboard_types::session::RemoteIdentity;
use switchboard_types::user::UserId;

use crate::remote::BoxRemoteSession;

/// A logged-in session owned by the registry.
#[derive(Debug, Clone)]
pub struct ActiveConnection {
    /// Distinguishes successive connections of the same user.
    pub connection_id: Uuid,
    pub user_id: UserId,
    pub session: BoxRemoteSession,
    pub identity: RemoteIdentity,
    pub connected_at: DateTime<Utc>,
    /// Stops the connection's event dispatcher.
    pub cancel: CancellationToken,
}

impl ActiveConnection {
    pub fn new(user_id: UserId, session: BoxRemoteSession, identity: RemoteIdentity) -> Self {
        Self {
            connection_id: Uuid::now_v7(),
            user_id,
            session,
            identity,
            connected_at: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop event dispatch, then close the transport.
    pub async fn teardown(&self) {
        self.cancel.cancel();
        self.session.disconnect().await;
    }
}

/// Map of user id to live connection. At most one entry per user.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    active: DashMap<UserId, ActiveConnection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloned snapshot of a user's connection.
    pub fn get(&self, user_id: &UserId) -> Option<ActiveConnection> {
        self.active.get(user_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.active.contains_key(user_id)
    }

    /// Install a connection. A connection it replaces is torn down first
    /// so no live session is ever dropped silently.
    pub async fn put(&self, connection: ActiveConnection) {
        let user_id = connection.user_id.clone();
        if let Some(previous) = self.active.insert(user_id.clone(), connection) {
            warn!(
                user_id = %user_id,
                connection_id = %previous.connection_id,
                "replacing live connection"
            );
            previous.teardown().await;
        }
    }

    /// Tear down and remove a user's connection. Returns whether one existed.
    pub async fn remove(&self, user_id: &UserId) -> bool {
        let Some((_, connection)) = self.active.remove(user_id) else {
            return false;
        };
        connection.teardown().await;
        debug!(user_id = %user_id, connection_id = %connection.connection_id, "connection removed");
        true
    }

    /// Remove a connection only if it is still the one identified by
    /// `connection_id`. Used when a dispatcher notices its own stream ended,
    /// so a newer connection for the same user is left alone.
    pub async fn remove_if_current(&self, user_id: &UserId, connection_id: Uuid) -> bool {
        let Some((_, connection)) = self
            .active
            .remove_if(user_id, |_, c| c.connection_id == connection_id)
        else {
            return false;
        };
        connection.teardown().await;
        true
    }

    /// Snapshot of all live connections.
    pub fn list_active(&self) -> Vec<ActiveConnection> {
        self.active.iter().map(|r| r.value().clone()).collect()
    }

    /// Tear down and remove every connection. Returns how many were removed.
    pub async fn drain(&self) -> usize {
        let users: Vec<UserId> = self.active.iter().map(|r| r.key().clone()).collect();
        let mut removed = 0;
        for user_id in users {
            if self.remove(&user_id).await {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
