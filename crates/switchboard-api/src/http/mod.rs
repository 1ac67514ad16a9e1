//! HTTP/JSON adapter over the session manager.
//!
//! Axum routes at `/api/v1/`. The caller's identity arrives in the
//! `X-User-Id` header, set by the authentication layer in front of this
//! service. Responses use the envelope in [`response`].

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
