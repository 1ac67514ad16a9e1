//! Observability setup for Switchboard binaries.

pub mod tracing_setup;
