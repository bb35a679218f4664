//! HTTP front-end for the website chat widget.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::chat::ChatService;
use crate::lead::LeadField;
use crate::session::{Platform, ProgressState, Session};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    /// Fields captured for the first time by this message.
    pub user_info_extracted: BTreeMap<String, String>,
    pub is_complete: bool,
    pub missing_fields: Vec<LeadField>,
    pub progress_state: ProgressState,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

/// Session view returned by the sessions endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub platform: Platform,
    pub progress_state: ProgressState,
    pub exchange_count: u32,
    pub is_complete: bool,
    pub missing_fields: Vec<LeadField>,
    pub collected: BTreeMap<String, String>,
    pub context: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            platform: session.platform,
            progress_state: session.progress_state,
            exchange_count: session.exchange_count,
            is_complete: session.is_complete(),
            missing_fields: session.missing(),
            collected: field_values(session, &LeadField::ALL),
            context: session.context_summary(),
            created_at: session.created_at,
            last_updated: session.last_updated,
        }
    }
}

fn field_values(session: &Session, fields: &[LeadField]) -> BTreeMap<String, String> {
    fields
        .iter()
        .filter_map(|f| {
            session
                .draft
                .value(*f)
                .map(|v| (f.as_str().to_string(), v))
        })
        .collect()
}

/// Build the router for the web API.
pub fn routes(chat: Arc<ChatService>, cors_origins: &[String]) -> Router {
    let state = AppState { chat };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions", get(list_sessions))
        .route(
            "/api/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(parsed)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lead-assist"
    }))
}

// ── Chat ────────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "message must not be empty"})),
        )
            .into_response();
    }

    let reply = state
        .chat
        .handle_web(req.session_id.as_deref(), &req.message)
        .await;

    // Commands skip the state machine; report whatever the session holds now.
    let (session, newly_filled) = match reply.turn {
        Some(turn) => (Some(turn.session), turn.outcome.newly_filled),
        None => (state.chat.manager().get(&reply.session_id).await, Vec::new()),
    };
    let session =
        session.unwrap_or_else(|| Session::new(reply.session_id.clone(), Platform::Web));

    Json(ChatResponse {
        response: reply.response,
        session_id: reply.session_id,
        user_info_extracted: field_values(&session, &newly_filled),
        is_complete: session.is_complete(),
        missing_fields: session.missing(),
        progress_state: session.progress_state,
        context: session.context_summary(),
        timestamp: Utc::now(),
    })
    .into_response()
}

// ── Sessions ────────────────────────────────────────────────────────────

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.chat.manager().active_sessions().await;
    let summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();
    Json(summaries)
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if !is_web_id(&id) {
        return session_not_found();
    }
    match state.chat.manager().get(&id).await {
        Some(session) => Json(SessionSummary::from(&session)).into_response(),
        None => session_not_found(),
    }
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if !is_web_id(&id) {
        return session_not_found();
    }
    state.chat.manager().clear(&id).await;
    StatusCode::NO_CONTENT.into_response()
}

/// Only web sessions are addressable over HTTP, matching what `/api/chat`
/// accepts.
fn is_web_id(id: &str) -> bool {
    Platform::for_session_id(id) == Platform::Web
}

fn session_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "session not found"})),
    )
        .into_response()
}
