//! The remote messaging capability.
//!
//! `RemoteSession` is one logged-in (or logging-in) client of the remote
//! network. `BoxRemoteSession` erases it for storage in the registries, and
//! `RemoteConnector` builds sessions from `SessionParams`.

pub mod box_session;
pub mod connector;
pub mod session;

pub use box_session::BoxRemoteSession;
pub use connector::RemoteConnector;
pub use session::{RemoteEventStream, RemoteSession};
