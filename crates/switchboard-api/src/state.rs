//! Application state wiring the session manager to its infrastructure.
//!
//! `AppState` pins the manager's generics to the SQLite stores, the
//! in-process delivery hub, and the loopback network.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use switchboard_core::delivery::DeliveryHub;
use switchboard_core::session::{ManagerConfig, SessionManager};
use switchboard_infra::config::load_global_config;
use switchboard_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use switchboard_infra::remote::{LoopbackConnector, LoopbackNetwork};
use switchboard_infra::sqlite::chat::SqliteChatStore;
use switchboard_infra::sqlite::pool::{DatabasePool, database_url};
use switchboard_infra::sqlite::session::SqliteSessionStore;
use switchboard_types::config::GlobalConfig;
use switchboard_types::remote::RemotePeer;

/// Concrete manager type used by the CLI and HTTP handlers.
pub type ConcreteSessionManager =
    SessionManager<SqliteSessionStore, SqliteChatStore, LoopbackConnector, DeliveryHub>;

/// Peer every loopback account can talk to.
pub const ECHO_PEER_ID: i64 = 1;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: ConcreteSessionManager,
    pub sessions: Arc<SqliteSessionStore>,
    pub hub: Arc<DeliveryHub>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Resolve the data directory, load config, open the database, and wire
    /// the manager.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_global_config(&data_dir).await;
        Self::build(data_dir, &config).await
    }

    pub async fn build(data_dir: PathBuf, config: &GlobalConfig) -> anyhow::Result<Self> {
        ensure_data_dir(&data_dir).await?;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        let network = LoopbackNetwork::default();
        network.add_peer(RemotePeer {
            id: ECHO_PEER_ID,
            username: Some("echo".to_string()),
            first_name: Some("Echo".to_string()),
            last_name: None,
        });

        let sessions = Arc::new(SqliteSessionStore::new(db_pool.clone()));
        let chats = Arc::new(SqliteChatStore::new(db_pool.clone()));
        let hub = Arc::new(DeliveryHub::new(config.delivery.room_capacity));

        let manager = SessionManager::new(
            Arc::clone(&sessions),
            chats,
            Arc::new(network.connector()),
            Arc::clone(&hub),
            ManagerConfig::from_global(config),
        );

        Ok(Self {
            manager,
            sessions,
            hub,
            data_dir,
            db_pool,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
