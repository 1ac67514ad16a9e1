//! Messaging handlers. All require a live connection.
//!
//! Endpoints:
//! - GET  /api/v1/dialogs?limit=                   - Conversation list
//! - GET  /api/v1/chats/{chat_id}/messages?limit=  - Chat history, oldest first
//! - POST /api/v1/chats/{chat_id}/messages         - Send a text message

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use switchboard_types::chat::{DomainChat, DomainMessage};
use switchboard_types::remote::SendOptions;

use crate::http::error::AppError;
use crate::http::extractors::query::LimitQuery;
use crate::http::extractors::user::CurrentUser;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
    #[serde(flatten)]
    pub options: SendOptions,
}

/// GET /api/v1/dialogs
pub async fn list_dialogs(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<DomainChat>>>, AppError> {
    let timer = RequestTimer::start();
    let chats = state.manager.list_dialogs(&user_id, query.limit).await?;
    Ok(Json(timer.finish(chats)))
}

/// GET /api/v1/chats/{chat_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(chat_id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<DomainMessage>>>, AppError> {
    let timer = RequestTimer::start();
    let messages = state
        .manager
        .list_history(&user_id, chat_id, query.limit)
        .await?;
    Ok(Json(timer.finish(messages)))
}

/// POST /api/v1/chats/{chat_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(chat_id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<DomainMessage>>, AppError> {
    let timer = RequestTimer::start();
    let message = state
        .manager
        .send(&user_id, chat_id, &body.text, &body.options)
        .await?;
    Ok(Json(timer.finish(message)))
}

#[cfg(test)]
mod tests {
    use switchboard_types::error::SessionError;
    use switchboard_types::user::UserId;

    use super::*;
    use crate::http::handlers::test_state::app_state;
    use crate::state::ECHO_PEER_ID;

    fn user() -> CurrentUser {
        CurrentUser(UserId::new("u2"))
    }

    fn send_body(text: &str) -> Json<SendMessageRequest> {
        Json(serde_json::from_value(serde_json::json!({ "text": text, "silent": true })).unwrap())
    }

    #[test]
    fn send_request_flattens_options() {
        let Json(body) = send_body("hi");
        assert_eq!(body.text, "hi");
        assert!(body.options.silent);
        assert!(body.options.reply_to.is_none());
    }

    #[tokio::test]
    async fn send_when_disconnected_is_not_connected() {
        let state = app_state().await;
        let err = send_message(State(state), user(), Path(123), send_body("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Session(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn connected_user_can_send_and_list() {
        let state = app_state().await;
        let user_id = UserId::new("u2");
        state
            .manager
            .start_verification(&user_id, "+84922222222", Some(1), Some("hash"))
            .await
            .unwrap();
        state
            .manager
            .submit_verification(&user_id, "12345", None)
            .await
            .unwrap();

        let Json(sent) = send_message(State(state.clone()), user(), Path(ECHO_PEER_ID), send_body("hello"))
            .await
            .unwrap();
        assert_eq!(sent.data.unwrap().text, "hello");

        let Json(history) = list_messages(
            State(state.clone()),
            user(),
            Path(ECHO_PEER_ID),
            Query(LimitQuery { limit: Some(1) }),
        )
        .await
        .unwrap();
        assert_eq!(history.data.unwrap().len(), 1);

        let Json(dialogs) = list_dialogs(State(state), user(), Query(LimitQuery::default()))
            .await
            .unwrap();
        let dialogs = dialogs.data.unwrap();
        assert_eq!(dialogs.len(), 1);
        assert_eq!(dialogs[0].title, "Echo");
    }
}
