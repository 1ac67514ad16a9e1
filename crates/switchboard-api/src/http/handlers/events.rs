//! WebSocket stream of a user's delivery room.
//!
//! `GET /api/v1/events` upgrades to a WebSocket and forwards every
//! `DeliveryEvent` published for the caller as a JSON text frame
//! (`{"event": "new-message", "payload": {...}}`). Clients may send
//! `{"type":"ping"}` and receive `{"type":"pong"}`. Closing the socket
//! leaves the user's remote session untouched.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use switchboard_types::event::DeliveryEvent;
use switchboard_types::user::UserId;

use crate::http::extractors::user::CurrentUser;
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Ping,
}

/// GET /api/v1/events
pub async fn events_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> impl IntoResponse {
    // Join the room before the upgrade completes so nothing published in
    // between is missed.
    let rx = state.hub.subscribe(&user_id);
    ws.on_upgrade(move |socket| forward_events(socket, user_id, rx))
}

async fn forward_events(
    socket: WebSocket,
    user_id: UserId,
    mut event_rx: broadcast::Receiver<DeliveryEvent>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    debug!(user_id = %user_id, "event stream opened");

    loop {
        tokio::select! {
            event_result = event_rx.recv() => {
                match event_result {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => {
                            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(user_id = %user_id, "failed to encode delivery event: {err}"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(user_id = %user_id, skipped, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(ClientCommand::Ping) => {
                                let pong = serde_json::json!({ "type": "pong" }).to_string();
                                if ws_sender.send(Message::Text(pong.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => debug!(user_id = %user_id, "ignoring client frame: {err}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        debug!(user_id = %user_id, "websocket receive error: {err}");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(user_id = %user_id, "event stream closed");
}
