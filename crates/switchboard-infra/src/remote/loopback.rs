//! In-process loopback network.
//!
//! A simulated remote network for local runs and integration tests. It
//! follows the same handshake as a real network (code, optional password,
//! exportable session blob) and pushes inbound events to live sessions, but
//! never leaves the process. Blobs look like
//! `loopback:<account>:<phone>:<nonce>`. A network that did not issue a blob
//! adopts the account it names, so saved sessions survive a process restart.
//! Blobs retired by log-out or revocation are refused.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

use switchboard_core::remote::{BoxRemoteSession, RemoteConnector, RemoteEventStream, RemoteSession};
use switchboard_types::error::RemoteError;
use switchboard_types::remote::{
    AuthStep, ChatKind, RemoteChat, RemoteDialog, RemoteEvent, RemoteMessage, RemotePeer,
    SendOptions, SessionParams,
};
use switchboard_types::session::RemoteIdentity;

pub const BLOB_PREFIX: &str = "loopback:";

const EVENT_BUFFER: usize = 64;

/// Behaviour of a loopback network.
#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    /// The login code every phone receives.
    pub login_code: String,
    /// Second-factor password required after the code, if any.
    pub password: Option<String>,
    /// Known peers answer every message with `echo: <text>`.
    pub echo: bool,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            login_code: "12345".to_string(),
            password: None,
            echo: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Account {
    id: i64,
    phone: String,
    /// Bumped on revocation; sessions logged in under an older generation
    /// are unauthorized.
    generation: u64,
}

struct ChatLog {
    chat: RemoteChat,
    messages: Vec<RemoteMessage>,
    unread: u32,
}

type Listener = (u64, broadcast::Sender<RemoteEvent>);

struct NetworkState {
    options: LoopbackOptions,
    next_account_id: AtomicI64,
    next_message_id: AtomicI64,
    next_listener_id: AtomicU64,
    accounts: DashMap<String, Account>,
    blobs: DashMap<String, String>,
    retired: DashSet<String>,
    banned: DashSet<String>,
    peers: DashMap<i64, RemotePeer>,
    chats: DashMap<(i64, i64), ChatLog>,
    listeners: DashMap<i64, Vec<Listener>>,
}

impl NetworkState {
    fn account(&self, phone: &str) -> Option<Account> {
        self.accounts.get(phone).map(|a| a.value().clone())
    }

    fn account_by_id(&self, id: i64) -> Option<Account> {
        self.accounts
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.value().clone())
    }

    fn open_account(&self, phone: &str) -> Account {
        self.accounts
            .entry(phone.to_string())
            .or_insert_with(|| Account {
                id: self.next_account_id.fetch_add(1, Ordering::Relaxed),
                phone: phone.to_string(),
                generation: 0,
            })
            .value()
            .clone()
    }

    /// Register the account named by a blob some other network issued.
    fn adopt(&self, blob: &str) -> Option<Account> {
        if self.retired.contains(blob) {
            return None;
        }
        let (id, phone) = parse_blob(blob)?;
        if self.account_by_id(id).is_some_and(|owner| owner.phone != phone) {
            return None;
        }
        let account = self
            .accounts
            .entry(phone.to_string())
            .or_insert_with(|| Account {
                id,
                phone: phone.to_string(),
                generation: 0,
            })
            .value()
            .clone();
        if account.id != id {
            return None;
        }
        self.next_account_id.fetch_max(id + 1, Ordering::Relaxed);
        self.blobs.insert(blob.to_string(), account.phone.clone());
        debug!(account_id = id, "loopback account adopted from blob");
        Some(account)
    }

    fn emit(&self, account_id: i64, event: RemoteEvent) {
        if let Some(listeners) = self.listeners.get(&account_id) {
            for (_, tx) in listeners.iter() {
                // No receiver yet is fine.
                let _ = tx.send(event.clone());
            }
        }
    }

    fn add_listener(&self, account_id: i64, tx: broadcast::Sender<RemoteEvent>) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.entry(account_id).or_default().push((id, tx));
        id
    }

    fn remove_listener(&self, account_id: i64, listener_id: u64) {
        if let Some(mut listeners) = self.listeners.get_mut(&account_id) {
            listeners.retain(|(id, _)| *id != listener_id);
        }
    }

    fn peer_chat(&self, peer_id: i64) -> Option<RemoteChat> {
        self.peers.get(&peer_id).map(|peer| RemoteChat {
            id: peer.id,
            kind: ChatKind::Private,
            title: Some(peer.display_name()),
            username: peer.username.clone(),
        })
    }

    /// Append a message to a chat log, creating the log for known peers.
    fn append(
        &self,
        account_id: i64,
        chat_id: i64,
        build: impl FnOnce(i64) -> RemoteMessage,
    ) -> Result<RemoteMessage, RemoteError> {
        let key = (account_id, chat_id);
        if !self.chats.contains_key(&key) {
            let chat = self
                .peer_chat(chat_id)
                .ok_or_else(|| RemoteError::PeerInvalid(chat_id.to_string()))?;
            self.chats.entry(key).or_insert_with(|| ChatLog {
                chat,
                messages: Vec::new(),
                unread: 0,
            });
        }

        let message = build(self.next_message_id.fetch_add(1, Ordering::Relaxed));
        let mut log = self
            .chats
            .get_mut(&key)
            .ok_or_else(|| RemoteError::PeerInvalid(chat_id.to_string()))?;
        if message.outgoing {
            log.unread = 0;
        } else {
            log.unread += 1;
        }
        log.messages.push(message.clone());
        Ok(message)
    }
}

/// Account id and phone of a well-formed blob.
fn parse_blob(blob: &str) -> Option<(i64, &str)> {
    let rest = blob.strip_prefix(BLOB_PREFIX)?;
    let (id, rest) = rest.split_once(':')?;
    let (phone, nonce) = rest.rsplit_once(':')?;
    if phone.is_empty() || nonce.is_empty() {
        return None;
    }
    Some((id.parse().ok()?, phone))
}

/// Handle to a simulated network. Clones share state.
#[derive(Clone)]
pub struct LoopbackNetwork {
    state: Arc<NetworkState>,
}

impl LoopbackNetwork {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            state: Arc::new(NetworkState {
                options,
                next_account_id: AtomicI64::new(1000),
                next_message_id: AtomicI64::new(1),
                next_listener_id: AtomicU64::new(1),
                accounts: DashMap::new(),
                blobs: DashMap::new(),
                retired: DashSet::new(),
                banned: DashSet::new(),
                peers: DashMap::new(),
                chats: DashMap::new(),
                listeners: DashMap::new(),
            }),
        }
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            network: self.clone(),
        }
    }

    /// Register a peer every account can message.
    pub fn add_peer(&self, peer: RemotePeer) {
        self.state.peers.insert(peer.id, peer);
    }

    /// Refuse logins for `phone`.
    pub fn ban(&self, phone: &str) {
        self.state.banned.insert(phone.to_string());
    }

    /// Remote account id assigned to `phone`, once it has logged in.
    pub fn account_id(&self, phone: &str) -> Option<i64> {
        self.state.account(phone).map(|a| a.id)
    }

    /// Deliver a message from `from_peer` to the account behind `phone`.
    ///
    /// Returns `None` when the account or peer is unknown.
    pub fn deliver(&self, phone: &str, from_peer: i64, text: &str) -> Option<RemoteMessage> {
        let account = self.state.account(phone)?;
        let message = self
            .state
            .append(account.id, from_peer, |id| RemoteMessage {
                id,
                chat_id: from_peer,
                sender_id: Some(from_peer),
                text: text.to_string(),
                media: None,
                outgoing: false,
                date: Utc::now(),
                edit_date: None,
                reply_to: None,
            })
            .ok()?;
        self.state
            .emit(account.id, RemoteEvent::NewMessage(message.clone()));
        Some(message)
    }

    /// Edit a message in place and notify the account.
    pub fn edit(&self, phone: &str, chat_id: i64, message_id: i64, text: &str) -> Option<RemoteMessage> {
        let account = self.state.account(phone)?;
        let edited = {
            let mut log = self.state.chats.get_mut(&(account.id, chat_id))?;
            let message = log.messages.iter_mut().find(|m| m.id == message_id)?;
            message.text = text.to_string();
            message.edit_date = Some(Utc::now());
            message.clone()
        };
        self.state
            .emit(account.id, RemoteEvent::MessageEdited(edited.clone()));
        Some(edited)
    }

    /// Invalidate every session of the account behind `phone`.
    pub fn revoke(&self, phone: &str) -> bool {
        let Some(account_id) = self.state.accounts.get_mut(phone).map(|mut account| {
            account.generation += 1;
            account.id
        }) else {
            return false;
        };
        self.state.blobs.retain(|blob, owner| {
            if owner.as_str() == phone {
                self.state.retired.insert(blob.clone());
                false
            } else {
                true
            }
        });
        self.state.emit(account_id, RemoteEvent::Unauthorized);
        debug!(account_id, "loopback account revoked");
        true
    }

    /// Drop every live transport of the account behind `phone`.
    pub fn drop_connections(&self, phone: &str) {
        let Some(account) = self.state.account(phone) else {
            return;
        };
        self.state.emit(
            account.id,
            RemoteEvent::ConnectionLost {
                reason: "dropped by loopback network".to_string(),
            },
        );
        self.state.listeners.remove(&account.id);
    }

    /// Number of sessions currently receiving events for `phone`.
    pub fn listener_count(&self, phone: &str) -> usize {
        self.state
            .account(phone)
            .and_then(|a| self.state.listeners.get(&a.id).map(|l| l.len()))
            .unwrap_or(0)
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new(LoopbackOptions::default())
    }
}

/// `RemoteConnector` over a [`LoopbackNetwork`].
#[derive(Clone)]
pub struct LoopbackConnector {
    network: LoopbackNetwork,
}

impl RemoteConnector for LoopbackConnector {
    fn open(&self, params: SessionParams) -> Result<BoxRemoteSession, RemoteError> {
        Ok(BoxRemoteSession::new(LoopbackSession::new(
            Arc::clone(&self.network.state),
            params,
        )))
    }
}

#[derive(Debug, Clone)]
struct Login {
    account_id: i64,
    phone: String,
    generation: u64,
}

#[derive(Default)]
struct SessionState {
    connected: bool,
    phone: Option<String>,
    awaiting_password: bool,
    login: Option<Login>,
    blob: Option<String>,
    events: Option<broadcast::Sender<RemoteEvent>>,
    listener: Option<(i64, u64)>,
}

/// One client of a [`LoopbackNetwork`].
pub struct LoopbackSession {
    network: Arc<NetworkState>,
    params: SessionParams,
    state: Mutex<SessionState>,
}

impl LoopbackSession {
    fn new(network: Arc<NetworkState>, params: SessionParams) -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            network,
            params,
            state: Mutex::new(SessionState {
                events: Some(tx),
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_connected(state: &SessionState) -> Result<(), RemoteError> {
        if state.connected {
            Ok(())
        } else {
            Err(RemoteError::Disconnected("transport not open".to_string()))
        }
    }

    /// The current login, if it has not been revoked since.
    fn require_login(&self, state: &SessionState) -> Result<Login, RemoteError> {
        Self::require_connected(state)?;
        let login = state.login.clone().ok_or(RemoteError::Unauthorized)?;
        match self.network.account(&login.phone) {
            Some(account) if account.generation == login.generation => Ok(login),
            _ => Err(RemoteError::Unauthorized),
        }
    }

    fn log_in(&self, state: &mut SessionState, account: Account) {
        if let (Some(tx), None) = (state.events.as_ref(), state.listener) {
            let listener_id = self.network.add_listener(account.id, tx.clone());
            state.listener = Some((account.id, listener_id));
        }
        state.login = Some(Login {
            account_id: account.id,
            phone: account.phone,
            generation: account.generation,
        });
        state.awaiting_password = false;
    }

    fn restore(&self, state: &mut SessionState) -> Result<(), RemoteError> {
        let blob = self.params.session_blob.trim();
        if blob.is_empty() {
            return Ok(());
        }
        if !blob.starts_with(BLOB_PREFIX) {
            return Err(RemoteError::Other("unrecognized session blob".to_string()));
        }
        let known = self.network.blobs.get(blob).map(|p| p.value().clone());
        let account = match known {
            Some(phone) => self.network.account(&phone),
            None => self.network.adopt(blob),
        }
        .ok_or(RemoteError::Unauthorized)?;
        state.blob = Some(blob.to_string());
        self.log_in(state, account);
        Ok(())
    }
}

impl RemoteSession for LoopbackSession {
    async fn connect(&self) -> Result<(), RemoteError> {
        let credentials = &self.params.credentials;
        if credentials.api_id <= 0 || credentials.api_hash.trim().is_empty() {
            return Err(RemoteError::Other("api credentials rejected".to_string()));
        }

        let mut state = self.state();
        if state.connected {
            return Ok(());
        }
        self.restore(&mut state)?;
        state.connected = true;
        Ok(())
    }

    async fn start_auth(&self, phone: &str) -> Result<AuthStep, RemoteError> {
        let mut state = self.state();
        Self::require_connected(&state)?;
        if self.require_login(&state).is_ok() {
            return Ok(AuthStep::Authorized);
        }
        if self.network.banned.contains(phone) {
            return Err(RemoteError::PhoneBanned);
        }
        state.phone = Some(phone.to_string());
        state.awaiting_password = false;
        Ok(AuthStep::CodeSent)
    }

    async fn submit_code(&self, code: &str) -> Result<AuthStep, RemoteError> {
        let mut state = self.state();
        Self::require_connected(&state)?;
        let phone = state
            .phone
            .clone()
            .ok_or_else(|| RemoteError::Other("no login code requested".to_string()))?;
        if code.trim() != self.network.options.login_code {
            return Err(RemoteError::CodeInvalid);
        }
        if self.network.options.password.is_some() {
            state.awaiting_password = true;
            return Ok(AuthStep::PasswordRequired {
                hint: Some("loopback".to_string()),
            });
        }
        let account = self.network.open_account(&phone);
        self.log_in(&mut state, account);
        Ok(AuthStep::Authorized)
    }

    async fn submit_password(&self, password: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        Self::require_connected(&state)?;
        if !state.awaiting_password {
            return Err(RemoteError::Other("no password requested".to_string()));
        }
        if self.network.options.password.as_deref() != Some(password) {
            return Err(RemoteError::PasswordInvalid);
        }
        let phone = state
            .phone
            .clone()
            .ok_or_else(|| RemoteError::Other("no login code requested".to_string()))?;
        let account = self.network.open_account(&phone);
        self.log_in(&mut state, account);
        Ok(())
    }

    async fn get_me(&self) -> Result<RemoteIdentity, RemoteError> {
        let login = self.require_login(&self.state())?;
        Ok(RemoteIdentity {
            remote_user_id: login.account_id,
            username: Some(format!("user{}", login.account_id)),
            first_name: Some("Loopback".to_string()),
            last_name: None,
            phone: Some(login.phone),
        })
    }

    async fn export_session(&self) -> Result<String, RemoteError> {
        let mut state = self.state();
        let login = self.require_login(&state)?;
        if let Some(blob) = &state.blob {
            return Ok(blob.clone());
        }
        let blob = format!(
            "{BLOB_PREFIX}{}:{}:{}",
            login.account_id,
            login.phone,
            Uuid::now_v7().simple()
        );
        self.network.blobs.insert(blob.clone(), login.phone);
        state.blob = Some(blob.clone());
        Ok(blob)
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<RemoteMessage, RemoteError> {
        let login = self.require_login(&self.state())?;
        let network = &self.network;

        let sent = network.append(login.account_id, chat_id, |id| RemoteMessage {
            id,
            chat_id,
            sender_id: Some(login.account_id),
            text: text.to_string(),
            media: None,
            outgoing: true,
            date: Utc::now(),
            edit_date: None,
            reply_to: options.reply_to,
        })?;
        network.emit(login.account_id, RemoteEvent::NewMessage(sent.clone()));

        if network.options.echo && network.peers.contains_key(&chat_id) {
            let reply = network.append(login.account_id, chat_id, |id| RemoteMessage {
                id,
                chat_id,
                sender_id: Some(chat_id),
                text: format!("echo: {text}"),
                media: None,
                outgoing: false,
                date: Utc::now(),
                edit_date: None,
                reply_to: Some(sent.id),
            })?;
            network.emit(login.account_id, RemoteEvent::NewMessage(reply));
        }

        Ok(sent)
    }

    async fn fetch_dialogs(&self, limit: u32) -> Result<Vec<RemoteDialog>, RemoteError> {
        let login = self.require_login(&self.state())?;
        let mut dialogs: Vec<RemoteDialog> = self
            .network
            .chats
            .iter()
            .filter(|entry| entry.key().0 == login.account_id)
            .map(|entry| RemoteDialog {
                chat: entry.chat.clone(),
                top_message: entry.messages.last().cloned(),
                unread_count: entry.unread,
            })
            .collect();
        dialogs.sort_by(|a, b| {
            let a_key = a.top_message.as_ref().map(|m| (m.date, m.id));
            let b_key = b.top_message.as_ref().map(|m| (m.date, m.id));
            b_key.cmp(&a_key)
        });
        dialogs.truncate(limit as usize);
        Ok(dialogs)
    }

    async fn fetch_history(&self, chat_id: i64, limit: u32) -> Result<Vec<RemoteMessage>, RemoteError> {
        let login = self.require_login(&self.state())?;
        match self.network.chats.get(&(login.account_id, chat_id)) {
            Some(log) => Ok(log
                .messages
                .iter()
                .rev()
                .take(limit as usize)
                .cloned()
                .collect()),
            None if self.network.peers.contains_key(&chat_id) => Ok(Vec::new()),
            None => Err(RemoteError::PeerInvalid(chat_id.to_string())),
        }
    }

    async fn resolve_chat(&self, chat_id: i64) -> Result<RemoteChat, RemoteError> {
        let login = self.require_login(&self.state())?;
        if let Some(log) = self.network.chats.get(&(login.account_id, chat_id)) {
            return Ok(log.chat.clone());
        }
        self.network
            .peer_chat(chat_id)
            .ok_or_else(|| RemoteError::PeerInvalid(chat_id.to_string()))
    }

    async fn resolve_peer(&self, peer_id: i64) -> Result<RemotePeer, RemoteError> {
        self.require_login(&self.state())?;
        if let Some(peer) = self.network.peers.get(&peer_id) {
            return Ok(peer.clone());
        }
        self.network
            .account_by_id(peer_id)
            .map(|account| RemotePeer {
                id: account.id,
                username: Some(format!("user{}", account.id)),
                first_name: Some("Loopback".to_string()),
                last_name: None,
            })
            .ok_or_else(|| RemoteError::PeerInvalid(peer_id.to_string()))
    }

    fn events(&self) -> RemoteEventStream {
        match self.state().events.as_ref() {
            Some(tx) => Box::pin(
                BroadcastStream::new(tx.subscribe())
                    .filter_map(|event| futures_util::future::ready(event.ok())),
            ),
            None => Box::pin(futures_util::stream::empty()),
        }
    }

    async fn log_out(&self) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.require_login(&state)?;
        if let Some(blob) = state.blob.take() {
            self.network.blobs.remove(&blob);
            self.network.retired.insert(blob);
        }
        state.login = None;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state();
        state.connected = false;
        if let Some((account_id, listener_id)) = state.listener.take() {
            self.network.remove_listener(account_id, listener_id);
        }
        // Dropping the last sender ends the event stream.
        state.events = None;
    }
}
