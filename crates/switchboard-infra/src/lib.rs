//! Infrastructure layer for Switchboard.
//!
//! Contains implementations of the ports defined in `switchboard-core`:
//! SQLite session and chat storage, the config loader, data directory
//! resolution, and an in-process loopback network for local runs.

pub mod config;
pub mod filesystem;
pub mod remote;
pub mod sqlite;
