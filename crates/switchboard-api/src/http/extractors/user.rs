//! Caller identity extractor.
//!
//! The authentication layer in front of this service resolves the end user
//! and forwards their id in `X-User-Id`. Every session route is scoped to
//! that user.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use switchboard_types::user::UserId;

use crate::http::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The user a request acts for.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized("Missing user identity. Provide it via the 'X-User-Id' header.".to_string())
        })?;
        let raw = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid X-User-Id header encoding".to_string()))?;
        let user_id = raw.parse::<UserId>().map_err(AppError::Unauthorized)?;
        Ok(CurrentUser(user_id))
    }
}
