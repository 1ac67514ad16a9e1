//! Session orchestration and port definitions for Switchboard.
//!
//! This crate owns the multi-tenant connection manager: the verification and
//! connection registries, the `SessionManager` that drives each user's remote
//! session through its handshake, and the `EventDispatcher` that stores and
//! publishes inbound messages.
//!
//! It also defines the "ports" the infrastructure layer implements
//! (`SessionStore`, `ChatStore`, `RemoteConnector`, `DeliveryPublisher`).
//! It depends only on `switchboard-types` -- never on `switchboard-infra`
//! or any database/IO crate.

pub mod delivery;
pub mod dispatch;
pub mod remote;
pub mod repository;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
