//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use switchboard_types::error::SessionError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Session(SessionError),
    /// Missing or malformed caller identity.
    Unauthorized(String),
    Validation(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

/// Status and stable code for a manager error.
pub fn session_error_status(error: &SessionError) -> (StatusCode, &'static str) {
    match error {
        SessionError::MissingCredentials => (StatusCode::UNPROCESSABLE_ENTITY, "MISSING_CREDENTIALS"),
        SessionError::InvalidPhone(_) => (StatusCode::BAD_REQUEST, "INVALID_PHONE"),
        SessionError::PhoneBanned => (StatusCode::FORBIDDEN, "PHONE_BANNED"),
        SessionError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        SessionError::AlreadyConnected => (StatusCode::CONFLICT, "ALREADY_CONNECTED"),
        SessionError::AlreadyPending => (StatusCode::CONFLICT, "ALREADY_PENDING"),
        SessionError::NoPendingVerification => (StatusCode::CONFLICT, "NO_PENDING_VERIFICATION"),
        SessionError::VerificationExpired => (StatusCode::GONE, "VERIFICATION_EXPIRED"),
        SessionError::InvalidCode => (StatusCode::BAD_REQUEST, "INVALID_CODE"),
        SessionError::CodeExpired => (StatusCode::BAD_REQUEST, "CODE_EXPIRED"),
        SessionError::InvalidPassword => (StatusCode::BAD_REQUEST, "INVALID_PASSWORD"),
        SessionError::PasswordRequired => (StatusCode::BAD_REQUEST, "PASSWORD_REQUIRED"),
        SessionError::VerificationFailed(_) => (StatusCode::BAD_GATEWAY, "VERIFICATION_FAILED"),
        SessionError::NoSavedSession => (StatusCode::NOT_FOUND, "NO_SAVED_SESSION"),
        SessionError::SessionRevoked => (StatusCode::UNAUTHORIZED, "SESSION_REVOKED"),
        SessionError::NotConnected => (StatusCode::CONFLICT, "NOT_CONNECTED"),
        SessionError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        SessionError::Remote(_) => (StatusCode::BAD_GATEWAY, "REMOTE_ERROR"),
        SessionError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Session(e) => {
                let (status, code) = session_error_status(e);
                let details = match e {
                    SessionError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Some(json!({ "retry_after_secs": secs })),
                    _ => None,
                };
                if status.is_server_error() {
                    tracing::warn!(error = %e, "request failed");
                }
                (status, code, e.to_string(), details)
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone(), None)
            }
        };

        (status, Json(ApiResponse::error(code, &message, details))).into_response()
    }
}
