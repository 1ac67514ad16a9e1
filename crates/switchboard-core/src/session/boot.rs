//! Reconnection of stored sessions at process start.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use switchboard_types::error::SessionError;
use switchboard_types::user::UserId;

use super::manager::SessionManager;
use crate::delivery::DeliveryPublisher;
use crate::remote::RemoteConnector;
use crate::repository::{ChatStore, SessionStore};

/// Outcome of `boot_reconnect_all`.
#[derive(Debug, Default)]
pub struct BootReport {
    pub attempted: usize,
    pub connected: usize,
    pub failed: Vec<(UserId, SessionError)>,
}

impl<S, M, C, P> SessionManager<S, M, C, P>
where
    S: SessionStore + 'static,
    M: ChatStore + 'static,
    C: RemoteConnector + 'static,
    P: DeliveryPublisher + 'static,
{
    /// Reconnect every stored session whose connected flag is set.
    ///
    /// Users are reconnected concurrently (bounded by
    /// `reconnect_concurrency`) and independently: one failure clears that
    /// user's flag and never stops the others. Only listing the stored rows
    /// can fail the whole call.
    pub async fn boot_reconnect_all(&self) -> Result<BootReport, SessionError> {
        let rows = self.inner.store.list_connectable().await?;
        let permits = Arc::new(Semaphore::new(self.inner.config.reconnect_concurrency.max(1)));

        let mut tasks = JoinSet::new();
        for row in rows {
            let manager = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let _guard = manager.inner.locks.lock(&row.user_id).await;
                let result = manager.connect_from_store_locked(&row.user_id).await;
                if let Err(e) = &result {
                    warn!(user_id = %row.user_id, error = %e, "boot reconnection failed");
                    manager.record_boot_failure(&row.user_id, e).await;
                }
                (row.user_id, result)
            });
        }

        let mut report = BootReport {
            attempted: tasks.len(),
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((user_id, Ok(identity))) => {
                    debug!(
                        user_id = %user_id,
                        remote_user_id = identity.remote_user_id,
                        "reconnected"
                    );
                    report.connected += 1;
                }
                Ok((user_id, Err(e))) => report.failed.push((user_id, e)),
                Err(e) => warn!(error = %e, "reconnection task aborted"),
            }
        }

        info!(
            attempted = report.attempted,
            connected = report.connected,
            failed = report.failed.len(),
            "boot reconnection finished"
        );
        Ok(report)
    }

    /// Clear the flag of a user whose reconnection failed. Runs under the
    /// user's lock; a user who connected meanwhile is left alone.
    async fn record_boot_failure(&self, user_id: &UserId, error: &SessionError) {
        if self.inner.connections.contains(user_id) {
            return;
        }
        if *error == SessionError::SessionRevoked {
            self.mark_revoked(user_id).await;
            return;
        }
        if let Err(e) = self
            .inner
            .store
            .mark_connected(user_id, false, Utc::now())
            .await
        {
            warn!(user_id = %user_id, error = %e, "failed to clear connected flag");
        }
    }
}
