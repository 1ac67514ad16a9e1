//! Inbound event ingestion: normalize, store, publish.

pub mod dispatcher;
pub mod normalize;

pub use dispatcher::{EventDispatcher, StreamEnd};
