//! Remote network adapters.
//!
//! Only the in-process loopback network lives here. A real protocol client
//! plugs in by implementing `RemoteConnector` and `RemoteSession` from
//! `switchboard-core`.

pub mod loopback;

pub use loopback::{LoopbackConnector, LoopbackNetwork, LoopbackOptions, LoopbackSession};
