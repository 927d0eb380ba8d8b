use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{self, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::channel::line::LineChannel;
use crate::dialogue::{messages, Router as DialogueRouter};
use crate::error::TurnError;

/// Shared application state for the HTTP API.
pub struct AppState {
    pub router: DialogueRouter,
    pub line: Option<Arc<LineChannel>>,
}

impl AppState {
    pub fn new(router: DialogueRouter, line: Option<LineChannel>) -> Self {
        Self {
            router,
            line: line.map(Arc::new),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    #[serde(default)]
    pub quick_replies: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
}

/// HTTP status for a failed turn.
pub fn status_for(err: &TurnError) -> StatusCode {
    match err {
        TurnError::Collaborator(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        TurnError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        TurnError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Create the axum Router with all API routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // API v1
        .route("/api/v1/chat", post(handle_chat))
        .route(
            "/api/v1/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        // Webhooks
        .route("/webhooks/line", post(handle_line_webhook))
        // Health
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([http::header::CONTENT_TYPE]),
        )
        .with_state(state)
}

/// POST /api/v1/chat: one dialogue turn
async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    info!("Chat request: user={}, text={}", req.user_id, req.text);

    if req.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ChatResponse {
                reply: "userId is required".to_string(),
                quick_replies: Vec::new(),
            }),
        );
    }

    match state.router.handle_turn(&req.user_id, &req.text).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(ChatResponse {
                reply: reply.text,
                quick_replies: reply.quick_replies,
            }),
        ),
        Err(e) => {
            error!("Chat turn failed for {}: {}", req.user_id, e);
            let reply = messages::for_error(&e);
            (
                status_for(&e),
                Json(ChatResponse {
                    reply: reply.text,
                    quick_replies: reply.quick_replies,
                }),
            )
        }
    }
}

/// GET /api/v1/sessions/{id}: current session snapshot
async fn handle_get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.router.store().get(&id).await {
        Some(session) => (StatusCode::OK, Json(serde_json::json!(session))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Session not found"})),
        ),
    }
}

/// DELETE /api/v1/sessions/{id}: drop a session
async fn handle_delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.router.store().remove(&id).await {
        (StatusCode::OK, Json(serde_json::json!({"deleted": true})))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"deleted": false, "error": "Session not found"})),
        )
    }
}

/// POST /webhooks/line: LINE webhook
async fn handle_line_webhook(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    body: String,
) -> impl IntoResponse {
    info!("LINE webhook received: {} bytes", body.len());

    let Some(line) = state.line.clone() else {
        warn!("LINE webhook received but the channel is disabled");
        return StatusCode::NOT_FOUND;
    };

    let signature = headers
        .get("x-line-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !LineChannel::verify_signature(line.channel_secret(), body.as_bytes(), signature) {
        warn!("LINE webhook signature mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let events = match LineChannel::parse_webhook_events(&body) {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to parse LINE webhook: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    // LINE expects a quick 200; turns run in the background
    for event in events {
        let line = line.clone();
        tokio::spawn(async move {
            line.process_event(&event).await;
        });
    }

    StatusCode::OK
}

/// GET /health: Health check
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions: state.router.store().len(),
    })
}

/// Start the HTTP server on the given address.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
