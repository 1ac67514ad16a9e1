//! In-memory doubles for the core ports.
//!
//! Locks are `std::sync::Mutex` and are never held across `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use switchboard_types::chat::{DomainChat, DomainMessage, WriteOutcome};
use switchboard_types::error::{DeliveryError, RemoteError, RepositoryError};
use switchboard_types::event::DeliveryEvent;
use switchboard_types::remote::{
    AuthStep, RemoteChat, RemoteDialog, RemoteEvent, RemoteMessage, RemotePeer, SendOptions,
    SessionParams,
};
use switchboard_types::session::{PersistedSession, RemoteIdentity};
use switchboard_types::user::UserId;

use crate::delivery::DeliveryPublisher;
use crate::remote::{BoxRemoteSession, RemoteConnector, RemoteEventStream, RemoteSession};
use crate::repository::{ChatStore, SessionStore};

pub const GOOD_CODE: &str = "24680";

pub fn identity(remote_user_id: i64) -> RemoteIdentity {
    RemoteIdentity {
        remote_user_id,
        username: Some(format!("user{remote_user_id}")),
        first_name: Some("Test".to_string()),
        last_name: None,
        phone: Some("+84912345678".to_string()),
    }
}

pub fn remote_message(id: i64, chat_id: i64, text: &str) -> RemoteMessage {
    RemoteMessage {
        id,
        chat_id,
        sender_id: Some(20),
        text: text.to_string(),
        media: None,
        outgoing: false,
        date: DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap_or_default(),
        edit_date: None,
        reply_to: None,
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ---------------------------------------------------------------------------
// ScriptedSession
// ---------------------------------------------------------------------------

struct Script {
    connect_error: Option<RemoteError>,
    connect_delay: Option<Duration>,
    start_auth: Result<AuthStep, RemoteError>,
    code_error: Option<RemoteError>,
    password: Option<String>,
    get_me: Result<RemoteIdentity, RemoteError>,
    exported_blob: Result<String, RemoteError>,
    send_error: Option<RemoteError>,
    fetch_error: Option<RemoteError>,
    log_out_error: Option<RemoteError>,
    dialogs: Vec<RemoteDialog>,
    history: Vec<RemoteMessage>,
    chats: HashMap<i64, RemoteChat>,
    peers: HashMap<i64, RemotePeer>,
    calls: Vec<&'static str>,
    events_rx: Option<mpsc::UnboundedReceiver<RemoteEvent>>,
}

/// A remote session whose every answer is configured by the test.
#[derive(Clone)]
pub struct ScriptedSession {
    script: Arc<Mutex<Script>>,
    events_tx: mpsc::UnboundedSender<RemoteEvent>,
    disconnects: Arc<AtomicUsize>,
    next_message_id: Arc<AtomicI64>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            script: Arc::new(Mutex::new(Script {
                connect_error: None,
                connect_delay: None,
                start_auth: Ok(AuthStep::CodeSent),
                code_error: None,
                password: None,
                get_me: Ok(identity(777)),
                exported_blob: Ok("exported-blob".to_string()),
                send_error: None,
                fetch_error: None,
                log_out_error: None,
                dialogs: Vec::new(),
                history: Vec::new(),
                chats: HashMap::new(),
                peers: HashMap::new(),
                calls: Vec::new(),
                events_rx: Some(events_rx),
            })),
            events_tx,
            disconnects: Arc::new(AtomicUsize::new(0)),
            next_message_id: Arc::new(AtomicI64::new(1000)),
        }
    }

    pub fn boxed(&self) -> BoxRemoteSession {
        BoxRemoteSession::new(self.clone())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap();
        f(&mut script)
    }

    fn record(&self, call: &'static str) {
        self.with(|s| s.calls.push(call));
    }

    /// Make `connect` suspend for `delay` before answering.
    pub fn delay_connect(&self, delay: Duration) {
        self.with(|s| s.connect_delay = Some(delay));
    }

    pub fn fail_connect(&self, error: RemoteError) {
        self.with(|s| s.connect_error = Some(error));
    }

    pub fn set_start_auth(&self, result: Result<AuthStep, RemoteError>) {
        self.with(|s| s.start_auth = result);
    }

    pub fn fail_code(&self, error: RemoteError) {
        self.with(|s| s.code_error = Some(error));
    }

    pub fn require_password(&self, password: &str) {
        self.with(|s| s.password = Some(password.to_string()));
    }

    pub fn set_get_me(&self, result: Result<RemoteIdentity, RemoteError>) {
        self.with(|s| s.get_me = result);
    }

    pub fn set_export(&self, result: Result<String, RemoteError>) {
        self.with(|s| s.exported_blob = result);
    }

    pub fn fail_send(&self, error: RemoteError) {
        self.with(|s| s.send_error = Some(error));
    }

    pub fn fail_fetch(&self, error: RemoteError) {
        self.with(|s| s.fetch_error = Some(error));
    }

    pub fn fail_log_out(&self, error: RemoteError) {
        self.with(|s| s.log_out_error = Some(error));
    }

    pub fn set_dialogs(&self, dialogs: Vec<RemoteDialog>) {
        self.with(|s| s.dialogs = dialogs);
    }

    /// History as the remote side returns it, newest first.
    pub fn set_history(&self, history: Vec<RemoteMessage>) {
        self.with(|s| s.history = history);
    }

    pub fn add_chat(&self, chat: RemoteChat) {
        self.with(|s| s.chats.insert(chat.id, chat));
    }

    pub fn add_peer(&self, peer: RemotePeer) {
        self.with(|s| s.peers.insert(peer.id, peer));
    }

    pub fn push_event(&self, event: RemoteEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.with(|s| s.calls.clone())
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls().iter().any(|c| *c == call)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl RemoteSession for ScriptedSession {
    async fn connect(&self) -> Result<(), RemoteError> {
        self.record("connect");
        if let Some(delay) = self.with(|s| s.connect_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with(|s| s.connect_error.clone()).map_or(Ok(()), Err)
    }

    async fn start_auth(&self, _phone: &str) -> Result<AuthStep, RemoteError> {
        self.record("start_auth");
        self.with(|s| s.start_auth.clone())
    }

    async fn submit_code(&self, code: &str) -> Result<AuthStep, RemoteError> {
        self.record("submit_code");
        let (error, password) = self.with(|s| (s.code_error.clone(), s.password.clone()));
        if let Some(error) = error {
            return Err(error);
        }
        if code != GOOD_CODE {
            return Err(RemoteError::CodeInvalid);
        }
        Ok(match password {
            Some(_) => AuthStep::PasswordRequired {
                hint: Some("pet".to_string()),
            },
            None => AuthStep::Authorized,
        })
    }

    async fn submit_password(&self, password: &str) -> Result<(), RemoteError> {
        self.record("submit_password");
        match self.with(|s| s.password.clone()) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(RemoteError::PasswordInvalid),
        }
    }

    async fn get_me(&self) -> Result<RemoteIdentity, RemoteError> {
        self.record("get_me");
        self.with(|s| s.get_me.clone())
    }

    async fn export_session(&self) -> Result<String, RemoteError> {
        self.record("export_session");
        self.with(|s| s.exported_blob.clone())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<RemoteMessage, RemoteError> {
        self.record("send_message");
        if let Some(error) = self.with(|s| s.send_error.clone()) {
            return Err(error);
        }
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        Ok(RemoteMessage {
            id,
            chat_id,
            sender_id: None,
            text: text.to_string(),
            media: None,
            outgoing: true,
            date: Utc::now(),
            edit_date: None,
            reply_to: options.reply_to,
        })
    }

    async fn fetch_dialogs(&self, limit: u32) -> Result<Vec<RemoteDialog>, RemoteError> {
        self.record("fetch_dialogs");
        self.with(|s| match s.fetch_error.clone() {
            Some(error) => Err(error),
            None => Ok(s.dialogs.iter().take(limit as usize).cloned().collect()),
        })
    }

    async fn fetch_history(&self, chat_id: i64, limit: u32) -> Result<Vec<RemoteMessage>, RemoteError> {
        self.record("fetch_history");
        self.with(|s| match s.fetch_error.clone() {
            Some(error) => Err(error),
            None => Ok(s
                .history
                .iter()
                .filter(|m| m.chat_id == chat_id)
                .take(limit as usize)
                .cloned()
                .collect()),
        })
    }

    async fn resolve_chat(&self, chat_id: i64) -> Result<RemoteChat, RemoteError> {
        self.with(|s| s.chats.get(&chat_id).cloned())
            .ok_or_else(|| RemoteError::PeerInvalid(chat_id.to_string()))
    }

    async fn resolve_peer(&self, peer_id: i64) -> Result<RemotePeer, RemoteError> {
        self.record("resolve_peer");
        self.with(|s| s.peers.get(&peer_id).cloned())
            .ok_or_else(|| RemoteError::PeerInvalid(peer_id.to_string()))
    }

    fn events(&self) -> RemoteEventStream {
        let rx = self.with(|s| s.events_rx.take());
        Box::pin(async_stream::stream! {
            if let Some(mut rx) = rx {
                while let Some(event) = rx.recv().await {
                    yield event;
                }
            }
        })
    }

    async fn log_out(&self) -> Result<(), RemoteError> {
        self.record("log_out");
        self.with(|s| s.log_out_error.clone()).map_or(Ok(()), Err)
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockConnector
// ---------------------------------------------------------------------------

/// Hands out queued scripts per user, or a fresh default script.
#[derive(Default)]
pub struct MockConnector {
    scripts: Mutex<HashMap<UserId, VecDeque<ScriptedSession>>>,
    opened: Mutex<Vec<(UserId, ScriptedSession, SessionParams)>>,
    open_error: Mutex<Option<RemoteError>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script the next `open` for `user` returns.
    pub fn queue(&self, user: &str, script: ScriptedSession) {
        self.scripts
            .lock()
            .unwrap()
            .entry(UserId::new(user))
            .or_default()
            .push_back(script);
    }

    pub fn fail_open(&self, error: RemoteError) {
        *self.open_error.lock().unwrap() = Some(error);
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    /// Parameters and script of the most recent `open` for `user`.
    pub fn last_opened(&self, user: &str) -> Option<(ScriptedSession, SessionParams)> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(u, _, _)| u.as_str() == user)
            .map(|(_, script, params)| (script.clone(), params.clone()))
    }
}

impl RemoteConnector for MockConnector {
    fn open(&self, params: SessionParams) -> Result<BoxRemoteSession, RemoteError> {
        if let Some(error) = self.open_error.lock().unwrap().clone() {
            return Err(error);
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&params.user_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(ScriptedSession::new);
        let boxed = script.boxed();
        self.opened
            .lock()
            .unwrap()
            .push((params.user_id.clone(), script, params));
        Ok(boxed)
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySessionStore {
    rows: Mutex<HashMap<UserId, PersistedSession>>,
    clear_delay: Mutex<Option<Duration>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: PersistedSession) {
        self.rows
            .lock()
            .unwrap()
            .insert(session.user_id.clone(), session);
    }

    pub fn row(&self, user: &str) -> Option<PersistedSession> {
        self.rows.lock().unwrap().get(&UserId::new(user)).cloned()
    }

    /// Suspend every `mark_connected(.., false, ..)` for `delay` before writing.
    pub fn delay_clear(&self, delay: Duration) {
        *self.clear_delay.lock().unwrap() = Some(delay);
    }
}

impl SessionStore for MemorySessionStore {
    async fn load(&self, user_id: &UserId) -> Result<Option<PersistedSession>, RepositoryError> {
        Ok(self.rows.lock().unwrap().get(user_id).cloned())
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), RepositoryError> {
        self.insert(session.clone());
        Ok(())
    }

    async fn mark_connected(
        &self,
        user_id: &UserId,
        connected: bool,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let delay = *self.clear_delay.lock().unwrap();
        if let (false, Some(delay)) = (connected, delay) {
            tokio::time::sleep(delay).await;
        }
        if let Some(row) = self.rows.lock().unwrap().get_mut(user_id) {
            row.is_connected = connected;
            if connected {
                row.last_connected_at = Some(at);
            }
            row.updated_at = at;
        }
        Ok(())
    }

    async fn list_connectable(&self) -> Result<Vec<PersistedSession>, RepositoryError> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_connectable())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(rows)
    }

    async fn list_all(&self) -> Result<Vec<PersistedSession>, RepositoryError> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        Ok(self.rows.lock().unwrap().remove(user_id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryChatStore {
    chats: Mutex<HashMap<(UserId, i64), DomainChat>>,
    messages: Mutex<HashMap<(UserId, i64, i64), DomainMessage>>,
    failing: AtomicBool,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        Ok(())
    }

    pub fn chat(&self, user_id: &UserId, chat_id: i64) -> Option<DomainChat> {
        self.chats
            .lock()
            .unwrap()
            .get(&(user_id.clone(), chat_id))
            .cloned()
    }

    pub fn messages_for(&self, user_id: &UserId) -> Vec<DomainMessage> {
        let mut messages: Vec<_> = self
            .messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| &m.user_id == user_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.sent_at, m.protocol_message_id));
        messages
    }
}

impl ChatStore for MemoryChatStore {
    async fn upsert_chat(&self, chat: &DomainChat) -> Result<(), RepositoryError> {
        self.check()?;
        let mut chats = self.chats.lock().unwrap();
        let key = (chat.user_id.clone(), chat.chat_id);
        let mut merged = chat.clone();
        if let Some(existing) = chats.get(&key) {
            if merged.unread_count.is_none() {
                merged.unread_count = existing.unread_count;
            }
            if existing.last_message_at > merged.last_message_at {
                merged.last_message_text = existing.last_message_text.clone();
                merged.last_message_at = existing.last_message_at;
            }
        }
        chats.insert(key, merged);
        Ok(())
    }

    async fn upsert_message(&self, message: &DomainMessage) -> Result<WriteOutcome, RepositoryError> {
        self.check()?;
        let mut messages = self.messages.lock().unwrap();
        let key = (
            message.user_id.clone(),
            message.protocol_message_id,
            message.chat_id,
        );
        let outcome = match messages.get(&key) {
            None => WriteOutcome::Inserted,
            Some(existing)
                if existing.text == message.text
                    && existing.media == message.media
                    && existing.edited_at == message.edited_at =>
            {
                return Ok(WriteOutcome::Unchanged);
            }
            Some(_) => WriteOutcome::Updated,
        };
        messages.insert(key, message.clone());
        Ok(outcome)
    }

    async fn list_chats(&self, user_id: &UserId, limit: u32) -> Result<Vec<DomainChat>, RepositoryError> {
        self.check()?;
        let mut chats: Vec<_> = self
            .chats
            .lock()
            .unwrap()
            .values()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        chats.truncate(limit as usize);
        Ok(chats)
    }

    async fn list_messages(
        &self,
        user_id: &UserId,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<DomainMessage>, RepositoryError> {
        self.check()?;
        let mut messages: Vec<_> = self
            .messages_for(user_id)
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect();
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages.split_off(skip))
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(UserId, DeliveryEvent)>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<(UserId, DeliveryEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn names_for(&self, user_id: &UserId) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, e)| e.name())
            .collect()
    }
}

impl DeliveryPublisher for RecordingPublisher {
    fn publish(&self, user_id: &UserId, event: DeliveryEvent) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unavailable("room closed".to_string()));
        }
        self.events.lock().unwrap().push((user_id.clone(), event));
        Ok(())
    }
}
