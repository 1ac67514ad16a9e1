//! The session orchestrator.
//!
//! `SessionManager` owns both registries and is their only writer. Every
//! state-changing operation for a user runs under that user's lock, so a
//! user is never both connected and awaiting a code, and never has two
//! live sessions.
//!
//! Handshake flow:
//!
//! ```text
//! Disconnected --start_verification--> AwaitingCode --submit_verification--> Connected
//!      ^                                    |                                    |
//!      +------- expiry / any failure -------+---- disconnect / fatal error ------+
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchboard_types::chat::{DomainChat, DomainMessage};
use switchboard_types::error::{RemoteError, RepositoryError, SessionError};
use switchboard_types::event::DeliveryEvent;
use switchboard_types::remote::{AuthStep, SendOptions, SessionParams};
use switchboard_types::session::{
    ApiCredentials, ConnectionStatus, PersistedSession, RemoteIdentity, VerificationOutcome,
    mask_phone,
};
use switchboard_types::user::UserId;

use super::config::ManagerConfig;
use super::connection::{ActiveConnection, ConnectionRegistry};
use super::credentials::{resolve_credentials, validate_phone};
use super::locks::UserLocks;
use super::verification::{CompleteError, PendingVerification, VerificationRegistry};
use crate::delivery::DeliveryPublisher;
use crate::dispatch::normalize::{chat_from_dialog, chat_from_remote, message_from_remote, unresolved_chat};
use crate::dispatch::{EventDispatcher, StreamEnd};
use crate::remote::{BoxRemoteSession, RemoteConnector};
use crate::repository::{ChatStore, SessionStore};

const REVOKED_REASON: &str = "session revoked by the remote network";

/// Multi-tenant manager of remote sessions.
///
/// Generic over its ports so switchboard-core never depends on
/// switchboard-infra. Cloning is cheap and shares all state.
pub struct SessionManager<S, M, C, P> {
    pub(super) inner: Arc<Inner<S, M, C, P>>,
}

pub(super) struct Inner<S, M, C, P> {
    pub(super) store: Arc<S>,
    pub(super) chats: Arc<M>,
    pub(super) connector: Arc<C>,
    pub(super) verifications: Arc<VerificationRegistry>,
    pub(super) connections: ConnectionRegistry,
    pub(super) locks: UserLocks,
    pub(super) dispatcher: EventDispatcher<M, P>,
    pub(super) config: ManagerConfig,
    pub(super) sweeper: CancellationToken,
}

impl<S, M, C, P> Clone for SessionManager<S, M, C, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, M, C, P> SessionManager<S, M, C, P>
where
    S: SessionStore + 'static,
    M: ChatStore + 'static,
    C: RemoteConnector + 'static,
    P: DeliveryPublisher + 'static,
{
    /// Create a manager. Nothing runs until `start_sweeper` or
    /// `boot_reconnect_all` is called.
    pub fn new(
        store: Arc<S>,
        chats: Arc<M>,
        connector: Arc<C>,
        publisher: Arc<P>,
        config: ManagerConfig,
    ) -> Self {
        let dispatcher = EventDispatcher::new(Arc::clone(&chats), publisher);
        Self {
            inner: Arc::new(Inner {
                store,
                chats,
                connector,
                verifications: Arc::new(VerificationRegistry::new(config.verification_ttl)),
                connections: ConnectionRegistry::new(),
                locks: UserLocks::new(),
                dispatcher,
                config,
                sweeper: CancellationToken::new(),
            }),
        }
    }

    /// Start the background sweep of expired verifications.
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        VerificationRegistry::spawn_sweeper(
            Arc::clone(&self.inner.verifications),
            self.inner.config.sweep_interval,
            self.inner.sweeper.clone(),
        )
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn is_connected(&self, user_id: &UserId) -> bool {
        self.inner.connections.contains(user_id)
    }

    /// Merged view of both registries for one user.
    pub fn status(&self, user_id: &UserId) -> ConnectionStatus {
        if let Some(connection) = self.inner.connections.get(user_id) {
            return ConnectionStatus::Connected {
                identity: connection.identity,
                connected_at: connection.connected_at,
            };
        }
        let ttl = self.inner.verifications.ttl();
        match self.inner.verifications.get(user_id) {
            Some(pending) if !pending.is_expired(Utc::now(), ttl) => ConnectionStatus::AwaitingCode {
                phone: mask_phone(&pending.phone),
                started_at: pending.started_at,
                expires_at: pending.expires_at(ttl),
            },
            _ => ConnectionStatus::Disconnected,
        }
    }

    /// Snapshot of all live connections.
    pub fn active_connections(&self) -> Vec<ActiveConnection> {
        self.inner.connections.list_active()
    }

    /// Restore a user's session from its stored blob.
    ///
    /// Idempotent: an existing connection is returned as-is. A failure does
    /// not touch the stored connected flag; callers decide what it means.
    pub async fn connect_from_store(&self, user_id: &UserId) -> Result<RemoteIdentity, SessionError> {
        let _guard = self.inner.locks.lock(user_id).await;
        self.connect_from_store_locked(user_id).await
    }

    /// `connect_from_store` body. The caller holds the user's lock.
    pub(super) async fn connect_from_store_locked(
        &self,
        user_id: &UserId,
    ) -> Result<RemoteIdentity, SessionError> {
        if let Some(connection) = self.inner.connections.get(user_id) {
            debug!(user_id = %user_id, "already connected");
            return Ok(connection.identity);
        }
        if self.has_live_pending(user_id).await {
            return Err(SessionError::AlreadyPending);
        }

        let stored = self
            .inner
            .store
            .load(user_id)
            .await?
            .filter(PersistedSession::has_blob)
            .ok_or(SessionError::NoSavedSession)?;

        let credentials = resolve_credentials(
            None,
            None,
            Some(&stored),
            self.inner.config.default_credentials.as_ref(),
        )?;
        let session = self.open_session(user_id, credentials, stored.session_blob.clone())?;

        let identity = match establish(&session).await {
            Ok(identity) => identity,
            Err(e) => {
                session.disconnect().await;
                debug!(user_id = %user_id, error = %e, "restoring session failed");
                return Err(map_remote_error(e));
            }
        };

        let mut row = stored;
        match session.export_session().await {
            Ok(blob) if !blob.trim().is_empty() => row.session_blob = blob,
            Ok(_) => {}
            Err(e) => debug!(user_id = %user_id, error = %e, "keeping stored session blob"),
        }
        let now = Utc::now();
        row.apply_identity(&identity);
        row.is_connected = true;
        row.last_connected_at = Some(now);
        row.updated_at = now;

        if let Err(e) = self.inner.store.save(&row).await {
            session.disconnect().await;
            return Err(e.into());
        }

        self.activate(user_id, session, identity.clone()).await;
        info!(
            user_id = %user_id,
            remote_user_id = identity.remote_user_id,
            "session restored"
        );
        Ok(identity)
    }

    /// Begin the login handshake.
    ///
    /// `NeedsVerification` is the normal outcome: the caller must follow up
    /// with `submit_verification`. When the remote side authorizes without
    /// a code, the session is activated immediately.
    pub async fn start_verification(
        &self,
        user_id: &UserId,
        phone: &str,
        api_id: Option<i32>,
        api_hash: Option<&str>,
    ) -> Result<VerificationOutcome, SessionError> {
        let phone = validate_phone(phone)?;
        let _guard = self.inner.locks.lock(user_id).await;

        if self.inner.connections.contains(user_id) {
            return Err(SessionError::AlreadyConnected);
        }
        if self.has_live_pending(user_id).await {
            return Err(SessionError::AlreadyPending);
        }

        let stored = self.inner.store.load(user_id).await?;
        let credentials = resolve_credentials(
            api_id,
            api_hash,
            stored.as_ref(),
            self.inner.config.default_credentials.as_ref(),
        )?;
        let session = self.open_session(user_id, credentials.clone(), String::new())?;

        let step = match begin_handshake(&session, &phone).await {
            Ok(step) => step,
            Err(e) => {
                session.disconnect().await;
                info!(user_id = %user_id, phone = %mask_phone(&phone), error = %e, "verification start failed");
                return Err(map_remote_error(e));
            }
        };

        match step {
            AuthStep::CodeSent => {
                let pending = PendingVerification {
                    user_id: user_id.clone(),
                    session,
                    phone: phone.clone(),
                    credentials,
                    started_at: Utc::now(),
                };
                if let Err(rejected) = self.inner.verifications.begin(pending) {
                    rejected.session.disconnect().await;
                    return Err(SessionError::AlreadyPending);
                }
                info!(user_id = %user_id, phone = %mask_phone(&phone), "verification code sent");
                Ok(VerificationOutcome::NeedsVerification)
            }
            AuthStep::Authorized => {
                let identity = self
                    .complete_handshake(user_id, session, &phone, &credentials)
                    .await?;
                Ok(VerificationOutcome::Connected { identity })
            }
            AuthStep::PasswordRequired { .. } => {
                session.disconnect().await;
                Err(SessionError::VerificationFailed(
                    "password requested before a code was submitted".to_string(),
                ))
            }
        }
    }

    /// Finish the handshake with the code (and password, when the account
    /// has one).
    ///
    /// The pending entry is consumed by every call that reaches it, so a
    /// failed attempt must restart with `start_verification`.
    pub async fn submit_verification(
        &self,
        user_id: &UserId,
        code: &str,
        password: Option<&str>,
    ) -> Result<RemoteIdentity, SessionError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SessionError::Validation(
                "verification code is required".to_string(),
            ));
        }
        let password = password.filter(|p| !p.is_empty());

        let _guard = self.inner.locks.lock(user_id).await;

        let pending = match self.inner.verifications.complete(user_id, Utc::now()) {
            Ok(pending) => pending,
            Err(CompleteError::NotFound) => return Err(SessionError::NoPendingVerification),
            Err(CompleteError::Expired(pending)) => {
                pending.session.disconnect().await;
                info!(user_id = %user_id, "verification expired before submission");
                return Err(SessionError::VerificationExpired);
            }
        };

        if let Err(e) = drive_code(&pending.session, code, password).await {
            pending.session.disconnect().await;
            info!(user_id = %user_id, error = %e, "verification failed");
            return Err(e);
        }

        self.complete_handshake(user_id, pending.session, &pending.phone, &pending.credentials)
            .await
    }

    /// Tear down a user's connection and clear the stored flag.
    /// Idempotent.
    pub async fn disconnect(&self, user_id: &UserId) -> Result<(), SessionError> {
        let _guard = self.inner.locks.lock(user_id).await;

        let removed = self.inner.connections.remove(user_id).await;
        self.inner
            .store
            .mark_connected(user_id, false, Utc::now())
            .await?;
        if removed {
            info!(user_id = %user_id, "session disconnected");
        }
        Ok(())
    }

    /// Revoke the session remotely (best effort), tear it down, and delete
    /// the stored row.
    pub async fn logout(&self, user_id: &UserId) -> Result<(), SessionError> {
        let _guard = self.inner.locks.lock(user_id).await;

        if let Some(connection) = self.inner.connections.get(user_id) {
            if let Err(e) = connection.session.log_out().await {
                warn!(user_id = %user_id, error = %e, "remote logout failed");
            }
        }
        self.inner.connections.remove(user_id).await;
        let deleted = self.inner.store.delete(user_id).await?;
        info!(user_id = %user_id, deleted, "session logged out");
        Ok(())
    }

    /// Send a text message and store it like any inbound message.
    pub async fn send(
        &self,
        user_id: &UserId,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<DomainMessage, SessionError> {
        let connection = self.require_connection(user_id)?;
        if text.trim().is_empty() {
            return Err(SessionError::Validation("message text is required".to_string()));
        }

        let sent = match connection.session.send_message(chat_id, text, options).await {
            Ok(sent) => sent,
            Err(e) => return Err(self.fail_operation(&connection, e).await),
        };

        let dispatcher = &self.inner.dispatcher;
        let (chat, message) = dispatcher.prepare(&connection, sent).await;
        if let Err(e) = dispatcher.store_and_publish(chat, message.clone()).await {
            warn!(user_id = %user_id, chat_id, error = %e, "sent message not stored");
        }
        Ok(message)
    }

    /// Fetch the user's conversation list and sync it into the chat store.
    pub async fn list_dialogs(
        &self,
        user_id: &UserId,
        limit: Option<u32>,
    ) -> Result<Vec<DomainChat>, SessionError> {
        let connection = self.require_connection(user_id)?;
        let limit = self.inner.config.dialog_limit(limit);

        let dialogs = match connection.session.fetch_dialogs(limit).await {
            Ok(dialogs) => dialogs,
            Err(e) => return Err(self.fail_operation(&connection, e).await),
        };

        let own_name = connection.identity.display_name();
        let now = Utc::now();
        let mut chats = Vec::with_capacity(dialogs.len());
        for dialog in &dialogs {
            let (chat, top) = chat_from_dialog(user_id, dialog, &own_name, now);
            if let Err(e) = self.sync_chat(&chat, top.as_slice()).await {
                warn!(user_id = %user_id, chat_id = chat.chat_id, error = %e, "dialog sync failed");
            }
            chats.push(chat);
        }
        debug!(user_id = %user_id, count = chats.len(), "dialogs listed");
        Ok(chats)
    }

    /// Fetch a chat's latest messages, oldest first, and sync them into the
    /// chat store.
    pub async fn list_history(
        &self,
        user_id: &UserId,
        chat_id: i64,
        limit: Option<u32>,
    ) -> Result<Vec<DomainMessage>, SessionError> {
        let connection = self.require_connection(user_id)?;
        let limit = self.inner.config.history_limit(limit);
        let session = &connection.session;

        let mut history = match session.fetch_history(chat_id, limit).await {
            Ok(history) => history,
            Err(e) => return Err(self.fail_operation(&connection, e).await),
        };
        history.sort_by_key(|m| (m.date, m.id));

        let remote_chat = match session.resolve_chat(chat_id).await {
            Ok(chat) => chat,
            Err(_) => unresolved_chat(chat_id),
        };

        let mut sender_names: HashMap<i64, Option<String>> = HashMap::new();
        for message in history.iter().filter(|m| !m.outgoing) {
            let Some(sender_id) = message.sender_id else {
                continue;
            };
            if sender_names.contains_key(&sender_id) {
                continue;
            }
            let name = session.resolve_peer(sender_id).await.ok().map(|p| p.display_name());
            sender_names.insert(sender_id, name);
        }

        let own_name = connection.identity.display_name();
        let messages: Vec<DomainMessage> = history
            .iter()
            .map(|m| {
                let sender_name = if m.outgoing {
                    Some(own_name.clone())
                } else {
                    m.sender_id
                        .and_then(|id| sender_names.get(&id).cloned().flatten())
                };
                message_from_remote(user_id, m, sender_name)
            })
            .collect();

        let chat = chat_from_remote(user_id, &remote_chat, messages.last(), None, Utc::now());
        if let Err(e) = self.sync_chat(&chat, &messages).await {
            warn!(user_id = %user_id, chat_id, error = %e, "history sync failed");
        }
        Ok(messages)
    }

    /// Stop the sweeper and tear down every session. Stored flags are left
    /// as they are so the next boot reconnects the same users.
    pub async fn shutdown(&self) {
        self.inner.sweeper.cancel();
        let pending = self.inner.verifications.drain().await;
        let connections = self.inner.connections.drain().await;
        info!(connections, pending, "session manager stopped");
    }

    fn require_connection(&self, user_id: &UserId) -> Result<ActiveConnection, SessionError> {
        self.inner
            .connections
            .get(user_id)
            .ok_or(SessionError::NotConnected)
    }

    fn open_session(
        &self,
        user_id: &UserId,
        credentials: ApiCredentials,
        session_blob: String,
    ) -> Result<BoxRemoteSession, SessionError> {
        self.inner
            .connector
            .open(SessionParams {
                user_id: user_id.clone(),
                credentials,
                session_blob,
            })
            .map_err(map_remote_error)
    }

    /// Whether a non-expired verification is pending. An expired entry is
    /// removed and torn down on the way.
    async fn has_live_pending(&self, user_id: &UserId) -> bool {
        let Some(pending) = self.inner.verifications.get(user_id) else {
            return false;
        };
        if !pending.is_expired(Utc::now(), self.inner.verifications.ttl()) {
            return true;
        }
        if let Some(expired) = self.inner.verifications.remove(user_id) {
            expired.session.disconnect().await;
            debug!(user_id = %user_id, "replaced expired verification");
        }
        false
    }

    /// Read identity, export the blob, persist, and activate.
    async fn complete_handshake(
        &self,
        user_id: &UserId,
        session: BoxRemoteSession,
        phone: &str,
        credentials: &ApiCredentials,
    ) -> Result<RemoteIdentity, SessionError> {
        let (identity, session_blob) = match finish_login(&session).await {
            Ok(result) => result,
            Err(e) => {
                session.disconnect().await;
                return Err(map_verification_error(e));
            }
        };

        let now = Utc::now();
        let mut row = PersistedSession {
            user_id: user_id.clone(),
            session_blob,
            api_id: Some(credentials.api_id),
            api_hash: Some(credentials.api_hash.clone()),
            phone: Some(phone.to_string()),
            remote_user_id: None,
            remote_username: None,
            remote_first_name: None,
            remote_last_name: None,
            is_connected: true,
            last_connected_at: Some(now),
            updated_at: now,
        };
        row.apply_identity(&identity);

        if let Err(e) = self.inner.store.save(&row).await {
            session.disconnect().await;
            return Err(e.into());
        }

        self.activate(user_id, session, identity.clone()).await;
        info!(
            user_id = %user_id,
            remote_user_id = identity.remote_user_id,
            "session verified"
        );
        Ok(identity)
    }

    /// Register the connection and start its dispatcher.
    async fn activate(&self, user_id: &UserId, session: BoxRemoteSession, identity: RemoteIdentity) {
        let connection = ActiveConnection::new(user_id.clone(), session, identity);
        self.inner.connections.put(connection.clone()).await;

        let events = connection.session.events();
        let manager = self.clone();
        tokio::spawn(async move {
            let end = manager.inner.dispatcher.run(connection.clone(), events).await;
            manager.on_stream_end(connection, end).await;
        });
    }

    async fn on_stream_end(&self, connection: ActiveConnection, end: StreamEnd) {
        let user_id = &connection.user_id;
        match &end {
            StreamEnd::Cancelled => {}
            StreamEnd::Closed | StreamEnd::Lost(_) => {
                let _guard = self.inner.locks.lock(user_id).await;
                if self
                    .inner
                    .connections
                    .remove_if_current(user_id, connection.connection_id)
                    .await
                {
                    warn!(user_id = %user_id, end = ?end, "connection lost");
                }
            }
            StreamEnd::Revoked => {
                let _guard = self.inner.locks.lock(user_id).await;
                if self
                    .inner
                    .connections
                    .remove_if_current(user_id, connection.connection_id)
                    .await
                {
                    warn!(user_id = %user_id, "session revoked remotely");
                    self.mark_revoked(user_id).await;
                }
            }
        }
    }

    /// Map a mid-operation failure, evicting the connection when the error
    /// means the session is unusable.
    async fn fail_operation(&self, connection: &ActiveConnection, error: RemoteError) -> SessionError {
        if error.is_connection_fatal() {
            let user_id = &connection.user_id;
            let _guard = self.inner.locks.lock(user_id).await;
            if self
                .inner
                .connections
                .remove_if_current(user_id, connection.connection_id)
                .await
            {
                warn!(user_id = %user_id, error = %error, "evicted connection after remote failure");
                if error == RemoteError::Unauthorized {
                    self.mark_revoked(user_id).await;
                }
            }
        }
        map_remote_error(error)
    }

    /// Clear the stored flag and tell the user's subscribers.
    pub(super) async fn mark_revoked(&self, user_id: &UserId) {
        if let Err(e) = self
            .inner
            .store
            .mark_connected(user_id, false, Utc::now())
            .await
        {
            warn!(user_id = %user_id, error = %e, "failed to clear connected flag");
        }
        self.inner.dispatcher.publish(
            user_id,
            DeliveryEvent::AuthFailed {
                reason: REVOKED_REASON.to_string(),
            },
        );
    }

    async fn sync_chat(&self, chat: &DomainChat, messages: &[DomainMessage]) -> Result<(), RepositoryError> {
        self.inner.chats.upsert_chat(chat).await?;
        for message in messages {
            self.inner.chats.upsert_message(message).await?;
        }
        Ok(())
    }
}

async fn establish(session: &BoxRemoteSession) -> Result<RemoteIdentity, RemoteError> {
    session.connect().await?;
    session.get_me().await
}

async fn begin_handshake(session: &BoxRemoteSession, phone: &str) -> Result<AuthStep, RemoteError> {
    session.connect().await?;
    session.start_auth(phone).await
}

async fn finish_login(session: &BoxRemoteSession) -> Result<(RemoteIdentity, String), RemoteError> {
    let identity = session.get_me().await?;
    let blob = session.export_session().await?;
    Ok((identity, blob))
}

async fn drive_code(
    session: &BoxRemoteSession,
    code: &str,
    password: Option<&str>,
) -> Result<(), SessionError> {
    match session.submit_code(code).await.map_err(map_verification_error)? {
        AuthStep::Authorized => Ok(()),
        AuthStep::PasswordRequired { hint } => match password {
            Some(password) => session
                .submit_password(password)
                .await
                .map_err(map_verification_error),
            None => {
                debug!(hint = ?hint, "two-factor password required");
                Err(SessionError::PasswordRequired)
            }
        },
        AuthStep::CodeSent => Err(SessionError::VerificationFailed(
            "remote side asked for another code".to_string(),
        )),
    }
}

/// Translate a remote failure into the manager's error taxonomy.
pub fn map_remote_error(error: RemoteError) -> SessionError {
    match error {
        RemoteError::PhoneInvalid => {
            SessionError::InvalidPhone("rejected by the remote network".to_string())
        }
        RemoteError::PhoneBanned => SessionError::PhoneBanned,
        RemoteError::CodeInvalid => SessionError::InvalidCode,
        RemoteError::CodeExpired => SessionError::CodeExpired,
        RemoteError::PasswordInvalid => SessionError::InvalidPassword,
        RemoteError::FloodWait { seconds } => SessionError::RateLimited {
            retry_after_secs: Some(seconds),
        },
        RemoteError::Unauthorized => SessionError::SessionRevoked,
        RemoteError::PeerInvalid(peer) => SessionError::Validation(format!("unknown peer {peer}")),
        RemoteError::Disconnected(_) | RemoteError::Timeout | RemoteError::Other(_) => {
            SessionError::Remote(error.to_string())
        }
    }
}

/// Like `map_remote_error`, but transport and generic failures during a
/// handshake end the attempt.
fn map_verification_error(error: RemoteError) -> SessionError {
    match error {
        RemoteError::Disconnected(_)
        | RemoteError::Timeout
        | RemoteError::Unauthorized
        | RemoteError::Other(_) => SessionError::VerificationFailed(error.to_string()),
        other => map_remote_error(other),
    }
}
