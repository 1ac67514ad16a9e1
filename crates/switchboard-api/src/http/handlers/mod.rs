//! Route handlers.

pub mod events;
pub mod messaging;
pub mod session;
