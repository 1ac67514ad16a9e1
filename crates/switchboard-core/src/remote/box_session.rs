//! BoxRemoteSession -- object-safe dynamic dispatch wrapper for RemoteSession.
//!
//! Same blanket-impl pattern as the other boxed ports:
//! 1. Define an object-safe `RemoteSessionDyn` trait with boxed futures
//! 2. Blanket-impl `RemoteSessionDyn` for all `T: RemoteSession`
//! 3. `BoxRemoteSession` wraps `Arc<dyn RemoteSessionDyn>` and delegates
//!
//! The wrapper is `Clone` so the connection registry, the dispatcher task,
//! and in-flight operations can share one live session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use switchboard_types::error::RemoteError;
use switchboard_types::remote::{
    AuthStep, RemoteChat, RemoteDialog, RemoteMessage, RemotePeer, SendOptions,
};
use switchboard_types::session::RemoteIdentity;

use super::session::{RemoteEventStream, RemoteSession};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`RemoteSession`] with boxed futures.
pub trait RemoteSessionDyn: Send + Sync {
    fn connect_boxed(&self) -> BoxFuture<'_, Result<(), RemoteError>>;

    fn start_auth_boxed<'a>(&'a self, phone: &'a str) -> BoxFuture<'a, Result<AuthStep, RemoteError>>;

    fn submit_code_boxed<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<AuthStep, RemoteError>>;

    fn submit_password_boxed<'a>(&'a self, password: &'a str) -> BoxFuture<'a, Result<(), RemoteError>>;

    fn get_me_boxed(&self) -> BoxFuture<'_, Result<RemoteIdentity, RemoteError>>;

    fn export_session_boxed(&self) -> BoxFuture<'_, Result<String, RemoteError>>;

    fn send_message_boxed<'a>(
        &'a self,
        chat_id: i64,
        text: &'a str,
        options: &'a SendOptions,
    ) -> BoxFuture<'a, Result<RemoteMessage, RemoteError>>;

    fn fetch_dialogs_boxed(&self, limit: u32) -> BoxFuture<'_, Result<Vec<RemoteDialog>, RemoteError>>;

    fn fetch_history_boxed(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<RemoteMessage>, RemoteError>>;

    fn resolve_chat_boxed(&self, chat_id: i64) -> BoxFuture<'_, Result<RemoteChat, RemoteError>>;

    fn resolve_peer_boxed(&self, peer_id: i64) -> BoxFuture<'_, Result<RemotePeer, RemoteError>>;

    fn events_boxed(&self) -> RemoteEventStream;

    fn log_out_boxed(&self) -> BoxFuture<'_, Result<(), RemoteError>>;

    fn disconnect_boxed(&self) -> BoxFuture<'_, ()>;
}

/// Blanket implementation: any `RemoteSession` automatically implements `RemoteSessionDyn`.
impl<T: RemoteSession> RemoteSessionDyn for T {
    fn connect_boxed(&self) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(self.connect())
    }

    fn start_auth_boxed<'a>(&'a self, phone: &'a str) -> BoxFuture<'a, Result<AuthStep, RemoteError>> {
        Box::pin(self.start_auth(phone))
    }

    fn submit_code_boxed<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<AuthStep, RemoteError>> {
        Box::pin(self.submit_code(code))
    }

    fn submit_password_boxed<'a>(&'a self, password: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(self.submit_password(password))
    }

    fn get_me_boxed(&self) -> BoxFuture<'_, Result<RemoteIdentity, RemoteError>> {
        Box::pin(self.get_me())
    }

    fn export_session_boxed(&self) -> BoxFuture<'_, Result<String, RemoteError>> {
        Box::pin(self.export_session())
    }

    fn send_message_boxed<'a>(
        &'a self,
        chat_id: i64,
        text: &'a str,
        options: &'a SendOptions,
    ) -> BoxFuture<'a, Result<RemoteMessage, RemoteError>> {
        Box::pin(self.send_message(chat_id, text, options))
    }

    fn fetch_dialogs_boxed(&self, limit: u32) -> BoxFuture<'_, Result<Vec<RemoteDialog>, RemoteError>> {
        Box::pin(self.fetch_dialogs(limit))
    }

    fn fetch_history_boxed(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<RemoteMessage>, RemoteError>> {
        Box::pin(self.fetch_history(chat_id, limit))
    }

    fn resolve_chat_boxed(&self, chat_id: i64) -> BoxFuture<'_, Result<RemoteChat, RemoteError>> {
        Box::pin(self.resolve_chat(chat_id))
    }

    fn resolve_peer_boxed(&self, peer_id: i64) -> BoxFuture<'_, Result<RemotePeer, RemoteError>> {
        Box::pin(self.resolve_peer(peer_id))
    }

    fn events_boxed(&self) -> RemoteEventStream {
        self.events()
    }

    fn log_out_boxed(&self) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(self.log_out())
    }

    fn disconnect_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.disconnect())
    }
}

/// Type-erased, shareable remote session.
///
/// Since `RemoteSession` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxRemoteSession` provides equivalent methods that delegate to
/// the inner `RemoteSessionDyn` trait object.
#[derive(Clone)]
pub struct BoxRemoteSession {
    inner: Arc<dyn RemoteSessionDyn>,
}

impl BoxRemoteSession {
    /// Wrap a concrete `RemoteSession` in a type-erased box.
    pub fn new<T: RemoteSession + 'static>(session: T) -> Self {
        Self {
            inner: Arc::new(session),
        }
    }

    pub async fn connect(&self) -> Result<(), RemoteError> {
        self.inner.connect_boxed().await
    }

    pub async fn start_auth(&self, phone: &str) -> Result<AuthStep, RemoteError> {
        self.inner.start_auth_boxed(phone).await
    }

    pub async fn submit_code(&self, code: &str) -> Result<AuthStep, RemoteError> {
        self.inner.submit_code_boxed(code).await
    }

    pub async fn submit_password(&self, password: &str) -> Result<(), RemoteError> {
        self.inner.submit_password_boxed(password).await
    }

    pub async fn get_me(&self) -> Result<RemoteIdentity, RemoteError> {
        self.inner.get_me_boxed().await
    }

    pub async fn export_session(&self) -> Result<String, RemoteError> {
        self.inner.export_session_boxed().await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<RemoteMessage, RemoteError> {
        self.inner.send_message_boxed(chat_id, text, options).await
    }

    pub async fn fetch_dialogs(&self, limit: u32) -> Result<Vec<RemoteDialog>, RemoteError> {
        self.inner.fetch_dialogs_boxed(limit).await
    }

    pub async fn fetch_history(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        self.inner.fetch_history_boxed(chat_id, limit).await
    }

    pub async fn resolve_chat(&self, chat_id: i64) -> Result<RemoteChat, RemoteError> {
        self.inner.resolve_chat_boxed(chat_id).await
    }

    pub async fn resolve_peer(&self, peer_id: i64) -> Result<RemotePeer, RemoteError> {
        self.inner.resolve_peer_boxed(peer_id).await
    }

    pub fn events(&self) -> RemoteEventStream {
        self.inner.events_boxed()
    }

    pub async fn log_out(&self) -> Result<(), RemoteError> {
        self.inner.log_out_boxed().await
    }

    pub async fn disconnect(&self) {
        self.inner.disconnect_boxed().await
    }
}

impl std::fmt::Debug for BoxRemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRemoteSession").finish_non_exhaustive()
    }
}
