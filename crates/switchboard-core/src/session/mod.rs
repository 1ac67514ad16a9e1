//! Per-user remote session lifecycle.
//!
//! `SessionManager` is the single entry point. It coordinates the two
//! in-memory registries (pending verifications and live connections), the
//! durable `SessionStore`, and the remote capability, serializing work per
//! user through `UserLocks`.

pub mod boot;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod locks;
pub mod manager;
pub mod verification;

pub use boot::BootReport;
pub use config::{DefaultCredentials, ManagerConfig};
pub use connection::{ActiveConnection, ConnectionRegistry};
pub use locks::{UserGuard, UserLocks};
pub use manager::SessionManager;
pub use verification::{PendingVerification, VerificationRegistry};
