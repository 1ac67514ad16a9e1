//! Session lifecycle handlers.
//!
//! Endpoints:
//! - POST /api/v1/session/connect             - Restore the stored session
//! - POST /api/v1/session/verification        - Begin a code login
//! - POST /api/v1/session/verification/submit - Submit the login code
//! - POST /api/v1/session/disconnect          - Tear down, keep the stored session
//! - POST /api/v1/session/logout              - Log out and delete the stored session
//! - GET  /api/v1/session/status              - Current connection state

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use switchboard_types::session::{ConnectionStatus, RemoteIdentity, VerificationOutcome};

use crate::http::error::AppError;
use crate::http::extractors::user::CurrentUser;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartVerificationRequest {
    pub phone: String,
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitVerificationRequest {
    pub code: String,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectedFlag {
    pub connected: bool,
}

/// POST /api/v1/session/connect
pub async fn connect(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<ApiResponse<RemoteIdentity>>, AppError> {
    let timer = RequestTimer::start();
    let identity = state.manager.connect_from_store(&user_id).await?;
    Ok(Json(timer.finish(identity)))
}

/// POST /api/v1/session/verification
pub async fn start_verification(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<StartVerificationRequest>,
) -> Result<Json<ApiResponse<VerificationOutcome>>, AppError> {
    let timer = RequestTimer::start();
    let outcome = state
        .manager
        .start_verification(&user_id, &body.phone, body.api_id, body.api_hash.as_deref())
        .await?;
    Ok(Json(timer.finish(outcome)))
}

/// POST /api/v1/session/verification/submit
pub async fn submit_verification(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<SubmitVerificationRequest>,
) -> Result<Json<ApiResponse<VerificationOutcome>>, AppError> {
    let timer = RequestTimer::start();
    let identity = state
        .manager
        .submit_verification(&user_id, &body.code, body.password.as_deref())
        .await?;
    Ok(Json(timer.finish(VerificationOutcome::Connected { identity })))
}

/// POST /api/v1/session/disconnect
pub async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<ApiResponse<ConnectedFlag>>, AppError> {
    let timer = RequestTimer::start();
    state.manager.disconnect(&user_id).await?;
    Ok(Json(timer.finish(ConnectedFlag { connected: false })))
}

/// POST /api/v1/session/logout
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<ApiResponse<ConnectedFlag>>, AppError> {
    let timer = RequestTimer::start();
    state.manager.logout(&user_id).await?;
    Ok(Json(timer.finish(ConnectedFlag { connected: false })))
}

/// GET /api/v1/session/status
pub async fn status(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Json<ApiResponse<ConnectionStatus>> {
    let timer = RequestTimer::start();
    Json(timer.finish(state.manager.status(&user_id)))
}
