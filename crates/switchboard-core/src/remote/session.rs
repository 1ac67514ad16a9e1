//! RemoteSession trait definition.
//!
//! Uses RPITIT (return position impl trait in traits) for async methods,
//! matching the repository traits. Not object-safe -- use
//! [`BoxRemoteSession`](super::BoxRemoteSession) for dynamic dispatch.

use std::pin::Pin;

use futures_util::Stream;

use switchboard_types::error::RemoteError;
use switchboard_types::remote::{
    AuthStep, RemoteChat, RemoteDialog, RemoteEvent, RemoteMessage, RemotePeer, SendOptions,
};
use switchboard_types::session::RemoteIdentity;

/// Inbound events of one session. Ends when the transport goes away.
pub type RemoteEventStream = Pin<Box<dyn Stream<Item = RemoteEvent> + Send + 'static>>;

/// One client of the remote messaging network.
///
/// Implementations must tolerate `disconnect` being called more than once
/// and at any point of the handshake.
pub trait RemoteSession: Send + Sync {
    /// Open the transport.
    fn connect(&self) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Request a login code for `phone`.
    ///
    /// Returns `Authorized` when the session is already logged in.
    fn start_auth(
        &self,
        phone: &str,
    ) -> impl std::future::Future<Output = Result<AuthStep, RemoteError>> + Send;

    /// Submit the login code received by the user.
    fn submit_code(
        &self,
        code: &str,
    ) -> impl std::future::Future<Output = Result<AuthStep, RemoteError>> + Send;

    /// Submit the second-factor password.
    fn submit_password(
        &self,
        password: &str,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// The account this session is logged in as.
    fn get_me(&self) -> impl std::future::Future<Output = Result<RemoteIdentity, RemoteError>> + Send;

    /// Serialize the session so it can be restored later without a code.
    fn export_session(&self) -> impl std::future::Future<Output = Result<String, RemoteError>> + Send;

    /// Send a text message and return the message as the network stored it.
    fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> impl std::future::Future<Output = Result<RemoteMessage, RemoteError>> + Send;

    /// The most recent `limit` conversations.
    fn fetch_dialogs(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteDialog>, RemoteError>> + Send;

    /// The most recent `limit` messages of a chat, newest first.
    fn fetch_history(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteMessage>, RemoteError>> + Send;

    fn resolve_chat(
        &self,
        chat_id: i64,
    ) -> impl std::future::Future<Output = Result<RemoteChat, RemoteError>> + Send;

    fn resolve_peer(
        &self,
        peer_id: i64,
    ) -> impl std::future::Future<Output = Result<RemotePeer, RemoteError>> + Send;

    /// Take the inbound event stream.
    ///
    /// Each call returns a stream fed by the same session; callers take it
    /// once per activation.
    fn events(&self) -> RemoteEventStream;

    /// Revoke the session on the remote side.
    fn log_out(&self) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Close the transport. Never fails.
    fn disconnect(&self) -> impl std::future::Future<Output = ()> + Send;
}
