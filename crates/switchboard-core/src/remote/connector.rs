//! RemoteConnector trait definition.

use switchboard_types::error::RemoteError;
use switchboard_types::remote::SessionParams;

use super::BoxRemoteSession;

/// Builds remote sessions. Construction does not touch the network;
/// the caller drives `connect` itself.
pub trait RemoteConnector: Send + Sync {
    fn open(&self, params: SessionParams) -> Result<BoxRemoteSession, RemoteError>;
}
