//! Axum router configuration with middleware.
//!
//! All session routes are under `/api/v1/`. Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Session lifecycle
        .route("/session/connect", post(handlers::session::connect))
        .route("/session/verification", post(handlers::session::start_verification))
        .route(
            "/session/verification/submit",
            post(handlers::session::submit_verification),
        )
        .route("/session/disconnect", post(handlers::session::disconnect))
        .route("/session/logout", post(handlers::session::logout))
        .route("/session/status", get(handlers::session::status))
        // Messaging
        .route("/dialogs", get(handlers::messaging::list_dialogs))
        .route(
            "/chats/{chat_id}/messages",
            get(handlers::messaging::list_messages).post(handlers::messaging::send_message),
        )
        // Real-time delivery
        .route("/events", get(handlers::events::events_ws));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness check, no user identity required.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
