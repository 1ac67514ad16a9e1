//! Shared domain types for Switchboard.
//!
//! This crate contains the plain data types passed between the session
//! manager, its storage and delivery collaborators, and the remote messaging
//! capability: user keys, persisted sessions, remote protocol records,
//! normalized chats/messages, delivery events, configuration, and errors.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod remote;
pub mod session;
pub mod user;
