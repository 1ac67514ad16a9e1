//! Per-connection event loop.
//!
//! One dispatcher task runs for each `ActiveConnection`. It reads the
//! session's inbound stream until the connection is cancelled or the stream
//! ends, storing every message idempotently and publishing changes to the
//! user's delivery room. Storage is the source of truth: publish failures
//! are logged and never undo a write.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use tracing::{debug, warn};

use switchboard_types::chat::{DomainChat, DomainMessage, WriteOutcome};
use switchboard_types::error::RepositoryError;
use switchboard_types::event::DeliveryEvent;
use switchboard_types::remote::{RemoteEvent, RemoteMessage};
use switchboard_types::user::UserId;

use super::normalize::{chat_from_remote, message_from_remote, unresolved_chat};
use crate::delivery::DeliveryPublisher;
use crate::remote::RemoteEventStream;
use crate::repository::ChatStore;
use crate::session::ActiveConnection;

/// Why a dispatcher loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The connection was torn down by its owner.
    Cancelled,
    /// The event stream ended without a reason.
    Closed,
    /// The transport reported it was lost.
    Lost(String),
    /// The remote side revoked the session.
    Revoked,
}

/// Stores and publishes inbound messages for live connections.
pub struct EventDispatcher<M, P> {
    chats: Arc<M>,
    publisher: Arc<P>,
}

impl<M, P> Clone for EventDispatcher<M, P> {
    fn clone(&self) -> Self {
        Self {
            chats: Arc::clone(&self.chats),
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<M: ChatStore, P: DeliveryPublisher> EventDispatcher<M, P> {
    pub fn new(chats: Arc<M>, publisher: Arc<P>) -> Self {
        Self { chats, publisher }
    }

    /// Consume `events` until the connection is cancelled or the stream ends.
    ///
    /// The stream is taken by the caller before the task is spawned so no
    /// event emitted right after activation is missed.
    pub async fn run(&self, connection: ActiveConnection, mut events: RemoteEventStream) -> StreamEnd {
        debug!(user_id = %connection.user_id, connection_id = %connection.connection_id, "dispatcher started");

        loop {
            let event = tokio::select! {
                biased;
                _ = connection.cancel.cancelled() => return StreamEnd::Cancelled,
                event = events.next() => event,
            };

            match event {
                Some(RemoteEvent::NewMessage(message)) | Some(RemoteEvent::MessageEdited(message)) => {
                    self.ingest(&connection, message).await;
                }
                Some(RemoteEvent::ConnectionLost { reason }) => return StreamEnd::Lost(reason),
                Some(RemoteEvent::Unauthorized) => return StreamEnd::Revoked,
                None => return StreamEnd::Closed,
            }
        }
    }

    /// Normalize, store, and publish one message. Storage errors are logged.
    pub async fn ingest(
        &self,
        connection: &ActiveConnection,
        message: RemoteMessage,
    ) -> Option<WriteOutcome> {
        let message_id = message.id;
        let (chat, message) = self.prepare(connection, message).await;
        match self.store_and_publish(chat, message).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(
                    user_id = %connection.user_id,
                    message_id,
                    error = %e,
                    "failed to store inbound message"
                );
                None
            }
        }
    }

    /// Resolve chat and sender through the session and build domain records.
    ///
    /// Lookup failures fall back to placeholder names rather than dropping
    /// the message.
    pub async fn prepare(
        &self,
        connection: &ActiveConnection,
        message: RemoteMessage,
    ) -> (DomainChat, DomainMessage) {
        let session = &connection.session;
        let remote_chat = match session.resolve_chat(message.chat_id).await {
            Ok(chat) => chat,
            Err(e) => {
                debug!(chat_id = message.chat_id, error = %e, "chat lookup failed");
                unresolved_chat(message.chat_id)
            }
        };

        let sender_name = if message.outgoing {
            Some(connection.identity.display_name())
        } else if let Some(sender_id) = message.sender_id {
            match session.resolve_peer(sender_id).await {
                Ok(peer) => Some(peer.display_name()),
                Err(e) => {
                    debug!(sender_id, error = %e, "sender lookup failed");
                    None
                }
            }
        } else {
            None
        };

        let message = message_from_remote(&connection.user_id, &message, sender_name);
        let chat = chat_from_remote(
            &connection.user_id,
            &remote_chat,
            Some(&message),
            None,
            Utc::now(),
        );
        (chat, message)
    }

    /// Upsert chat then message; publish only when the message row changed.
    pub async fn store_and_publish(
        &self,
        chat: DomainChat,
        message: DomainMessage,
    ) -> Result<WriteOutcome, RepositoryError> {
        self.chats.upsert_chat(&chat).await?;
        let outcome = self.chats.upsert_message(&message).await?;

        if !outcome.is_changed() {
            debug!(
                user_id = %message.user_id,
                chat_id = message.chat_id,
                message_id = message.protocol_message_id,
                "duplicate message ignored"
            );
            return Ok(outcome);
        }

        let user_id = message.user_id.clone();
        self.publish(
            &user_id,
            DeliveryEvent::NewMessage {
                message,
                chat: chat.clone(),
            },
        );
        self.publish(&user_id, DeliveryEvent::ChatUpdated { chat });
        Ok(outcome)
    }

    /// Best-effort publish.
    pub fn publish(&self, user_id: &UserId, event: DeliveryEvent) {
        let name = event.name();
        if let Err(e) = self.publisher.publish(user_id, event) {
            warn!(user_id = %user_id, event = name, error = %e, "delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use switchboard_types::chat::Direction;
    use switchboard_types::remote::{ChatKind, RemoteChat, RemotePeer};

    use super::*;
    use crate::test_support::{
        MemoryChatStore, RecordingPublisher, ScriptedSession, identity, remote_message,
    };

    fn setup() -> (
        EventDispatcher<MemoryChatStore, RecordingPublisher>,
        Arc<MemoryChatStore>,
        Arc<RecordingPublisher>,
    ) {
        let chats = Arc::new(MemoryChatStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = EventDispatcher::new(Arc::clone(&chats), Arc::clone(&publisher));
        (dispatcher, chats, publisher)
    }

    fn connection(script: &ScriptedSession) -> ActiveConnection {
        ActiveConnection::new(UserId::new("u1"), script.boxed(), identity(1))
    }

    #[tokio::test]
    async fn ingest_stores_and_publishes() {
        let (dispatcher, chats, publisher) = setup();
        let script = ScriptedSession::new();
        script.add_chat(RemoteChat {
            id: 10,
            kind: ChatKind::Private,
            title: Some("Bob".to_string()),
            username: None,
        });
        script.add_peer(RemotePeer {
            id: 20,
            username: None,
            first_name: Some("Bob".to_string()),
            last_name: Some("Smith".to_string()),
        });
        let conn = connection(&script);

        let outcome = dispatcher.ingest(&conn, remote_message(1, 10, "hi")).await;
        assert_eq!(outcome, Some(WriteOutcome::Inserted));

        let stored = chats.messages_for(&UserId::new("u1"));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender_name.as_deref(), Some("Bob Smith"));
        assert_eq!(stored[0].direction, Direction::Inbound);
        assert_eq!(chats.chat(&UserId::new("u1"), 10).unwrap().title, "Bob");
        assert_eq!(
            publisher.names_for(&UserId::new("u1")),
            vec![DeliveryEvent::NEW_MESSAGE, DeliveryEvent::CHAT_UPDATED]
        );
    }

    #[tokio::test]
    async fn duplicate_delivery_is_stored_once_and_not_republished() {
        let (dispatcher, chats, publisher) = setup();
        let script = ScriptedSession::new();
        let conn = connection(&script);

        let message = remote_message(1, 10, "hi");
        dispatcher.ingest(&conn, message.clone()).await;
        let second = dispatcher.ingest(&conn, message).await;

        assert_eq!(second, Some(WriteOutcome::Unchanged));
        assert_eq!(chats.messages_for(&UserId::new("u1")).len(), 1);
        assert_eq!(publisher.events().len(), 2);
    }

    #[tokio::test]
    async fn edit_updates_row_and_republishes_new_message() {
        let (dispatcher, chats, publisher) = setup();
        let script = ScriptedSession::new();
        let conn = connection(&script);

        dispatcher.ingest(&conn, remote_message(1, 10, "hi")).await;
        let mut edited = remote_message(1, 10, "hello");
        edited.edit_date = Some(Utc::now());
        let outcome = dispatcher.ingest(&conn, edited).await;

        assert_eq!(outcome, Some(WriteOutcome::Updated));
        let stored = chats.messages_for(&UserId::new("u1"));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "hello");
        assert_eq!(
            publisher.names_for(&UserId::new("u1"))[2],
            DeliveryEvent::NEW_MESSAGE
        );
    }

    #[tokio::test]
    async fn publish_failure_keeps_storage_write() {
        let (dispatcher, chats, publisher) = setup();
        publisher.set_failing(true);
        let script = ScriptedSession::new();
        let conn = connection(&script);

        let outcome = dispatcher.ingest(&conn, remote_message(1, 10, "hi")).await;
        assert_eq!(outcome, Some(WriteOutcome::Inserted));
        assert_eq!(chats.messages_for(&UserId::new("u1")).len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_publishes_nothing() {
        let (dispatcher, chats, publisher) = setup();
        chats.set_failing(true);
        let script = ScriptedSession::new();
        let conn = connection(&script);

        assert_eq!(dispatcher.ingest(&conn, remote_message(1, 10, "hi")).await, None);
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn lookup_failures_fall_back() {
        let (dispatcher, _, _) = setup();
        let script = ScriptedSession::new();
        let conn = connection(&script);

        let (chat, message) = dispatcher.prepare(&conn, remote_message(1, -500, "x")).await;
        assert_eq!(chat.kind, ChatKind::Group);
        assert_eq!(chat.title, "-500");
        assert!(message.sender_name.is_none());
    }

    #[tokio::test]
    async fn outgoing_messages_use_own_name() {
        let (dispatcher, _, _) = setup();
        let script = ScriptedSession::new();
        let conn = connection(&script);

        let mut message = remote_message(1, 10, "x");
        message.outgoing = true;
        let (_, message) = dispatcher.prepare(&conn, message).await;
        assert_eq!(message.sender_name, Some(conn.identity.display_name()));
    }

    #[tokio::test]
    async fn run_processes_events_until_stream_ends() {
        let (dispatcher, chats, _) = setup();
        let script = ScriptedSession::new();
        let conn = connection(&script);

        script.push_event(RemoteEvent::NewMessage(remote_message(1, 10, "a")));
        script.push_event(RemoteEvent::MessageEdited(remote_message(1, 10, "b")));
        script.push_event(RemoteEvent::ConnectionLost {
            reason: "eof".to_string(),
        });

        let events = conn.session.events();
        let end = dispatcher.run(conn, events).await;
        assert_eq!(end, StreamEnd::Lost("eof".to_string()));
        assert_eq!(chats.messages_for(&UserId::new("u1"))[0].text, "b");
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (dispatcher, _, _) = setup();
        let script = ScriptedSession::new();
        let conn = connection(&script);
        let cancel = conn.cancel.clone();

        let events = conn.session.events();
        let handle = tokio::spawn(async move { dispatcher.run(conn, events).await });
        cancel.cancel();
        let end = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end, StreamEnd::Cancelled);
    }

    #[tokio::test]
    async fn run_reports_revocation() {
        let (dispatcher, _, _) = setup();
        let script = ScriptedSession::new();
        script.push_event(RemoteEvent::Unauthorized);
        let conn = connection(&script);
        let events = conn.session.events();
        assert_eq!(dispatcher.run(conn, events).await, StreamEnd::Revoked);
    }
}
