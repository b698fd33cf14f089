//! HTTP server.
//!
//! Exposes intent classification and per-chat turn handling as a JSON API
//! for browser front-ends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat/intent` | Classify a message |
//! | `POST` | `/api/chat/{session}/send` | Run one turn |
//! | `POST` | `/api/chat/{session}/edit` | Replace a message and resend |
//! | `POST` | `/api/chat/{session}/stop` | Abort the running generation |
//! | `POST` | `/api/chat/{session}/clear` | Forget the last search context |
//! | `POST` | `/api/chat/{session}/new` | Start a fresh chat |
//! | `GET`  | `/api/chat/{session}/state` | Conversation snapshot |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `{session}` is any client-chosen key. If it names a stored chat, the
//! session resumes that chat's history the first time it is used.
//!
//! Each session reports to its own notification channel. `send`, `edit`,
//! `clear` and `new` return whatever the session reported since the last
//! such call in a `notifications` array.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "a response is already being generated; ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500). Failed turns are not HTTP errors: they come back as a
//! `failed` outcome with the restored input.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::ChatError;
use crate::intent::{ClassifyContext, Intent};
use crate::models::ChatSettings;
use crate::notify::{ChannelNotifier, Notification, TracingNotifier};
use crate::orchestrator::{ChatSession, Services, SessionOptions, TurnOutcome};
use crate::state::ConversationSnapshot;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    services: Services,
    options: SessionOptions,
    settings: ChatSettings,
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

/// An open session and the receiving end of its notifier.
#[derive(Clone)]
struct SessionEntry {
    session: Arc<ChatSession>,
    notifications: Arc<Mutex<UnboundedReceiver<Notification>>>,
}

impl SessionEntry {
    fn drain(&self) -> Vec<Notification> {
        let mut rx = self.notifications.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }
}

impl AppState {
    pub fn new(services: Services, options: SessionOptions, settings: ChatSettings) -> Self {
        Self {
            services,
            options,
            settings,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn existing(&self, key: &str) -> Option<SessionEntry> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// The session for `key`, resuming a stored chat of that id if there is one.
    async fn session(&self, key: &str) -> Result<SessionEntry, AppError> {
        if let Some(entry) = self.existing(key) {
            return Ok(entry);
        }

        let (notifier, rx) = ChannelNotifier::new();
        let services = Services {
            notifier: Arc::new(notifier),
            ..self.services.clone()
        };

        let stored = self.services.store.get_chat(key).await.map_err(internal)?;
        let session = match stored {
            Some(_) => ChatSession::resume(services, self.options.clone(), self.settings.clone(), key)
                .await
                .map_err(internal)?,
            None => ChatSession::new(services, self.options.clone(), self.settings.clone()),
        };

        let entry = SessionEntry {
            session: Arc::new(session),
            notifications: Arc::new(Mutex::new(rx)),
        };
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.to_string())
            .or_insert(entry)
            .clone())
    }
}

/// Starts the HTTP server on `[server].bind`. Runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let services = Services::from_config(config, Arc::new(TracingNotifier)).await?;
    let state = AppState::new(
        services,
        SessionOptions::from_config(config),
        config.chat_settings(),
    );

    let app = router(state);

    info!(%bind_addr, "chat server listening");
    println!("Chat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat/intent", post(handle_intent))
        .route("/api/chat/{session}/send", post(handle_send))
        .route("/api/chat/{session}/edit", post(handle_edit))
        .route("/api/chat/{session}/stop", post(handle_stop))
        .route("/api/chat/{session}/clear", post(handle_clear))
        .route("/api/chat/{session}/new", post(handle_new))
        .route("/api/chat/{session}/state", get(handle_state))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        let (status, code) = match err {
            ChatError::EmptyInput => (StatusCode::BAD_REQUEST, "bad_request"),
            ChatError::Busy => (StatusCode::CONFLICT, "conflict"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/chat/intent ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    previous_summary: Option<String>,
}

#[derive(Serialize)]
struct IntentResponse {
    intent: Intent,
}

async fn handle_intent(
    State(state): State<AppState>,
    Json(req): Json<IntentRequest>,
) -> Result<Json<IntentResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let ctx = ClassifyContext {
        has_prior_chunks: req.previous_summary.is_some(),
        last_summary: req.previous_summary,
    };
    let intent = state.services.classifier.classify(&req.message, &ctx).await;
    Ok(Json(IntentResponse { intent }))
}

// ============ Turn endpoints ============

#[derive(Deserialize)]
struct SendRequest {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct EditRequest {
    sequence_number: i64,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct TurnResponse {
    chat_id: Option<String>,
    text: String,
    outcome: TurnOutcome,
    notifications: Vec<Notification>,
}

fn turn_response(entry: &SessionEntry, outcome: TurnOutcome) -> Json<TurnResponse> {
    Json(TurnResponse {
        chat_id: entry.session.chat_id(),
        text: outcome.display_text(),
        outcome,
        notifications: entry.drain(),
    })
}

async fn handle_send(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let entry = state.session(&key).await?;
    let outcome = entry.session.submit(&req.message).await?;
    Ok(turn_response(&entry, outcome))
}

async fn handle_edit(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<EditRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let entry = state.session(&key).await?;
    let outcome = entry
        .session
        .edit_and_resend(req.sequence_number, &req.content)
        .await?;
    Ok(turn_response(&entry, outcome))
}

#[derive(Serialize)]
struct StopResponse {
    stopped: bool,
}

async fn handle_stop(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<StopResponse> {
    let stopped = state
        .existing(&key)
        .map(|e| e.session.stop())
        .unwrap_or(false);
    Json(StopResponse { stopped })
}

#[derive(Serialize)]
struct AckResponse {
    ok: bool,
    notifications: Vec<Notification>,
}

async fn handle_clear(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<AckResponse> {
    let notifications = match state.existing(&key) {
        Some(entry) => {
            entry.session.clear_context();
            entry.drain()
        }
        None => Vec::new(),
    };
    Json(AckResponse {
        ok: true,
        notifications,
    })
}

async fn handle_new(State(state): State<AppState>, Path(key): Path<String>) -> Json<AckResponse> {
    let notifications = match state.existing(&key) {
        Some(entry) => {
            entry.session.new_chat();
            entry.drain()
        }
        None => Vec::new(),
    };
    Json(AckResponse {
        ok: true,
        notifications,
    })
}

#[derive(Serialize)]
struct StateResponse {
    chat_id: Option<String>,
    #[serde(flatten)]
    snapshot: ConversationSnapshot,
}

async fn handle_state(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<StateResponse>, AppError> {
    let entry = state
        .existing(&key)
        .ok_or_else(|| not_found(format!("no open session: {}", key)))?;
    Ok(Json(StateResponse {
        chat_id: entry.session.chat_id(),
        snapshot: entry.session.snapshot(),
    }))
}
