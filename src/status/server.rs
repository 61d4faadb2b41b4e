//! Local control API: health, per-account status, and stop.

use super::sink::StatusBoard;
use crate::core::state::BotState;
use crate::core::types::{ActionLogEntry, StateChange};
use crate::engine::OrchestratorHandle;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

pub struct ControlState {
    pub handles: Vec<OrchestratorHandle>,
    pub board: Arc<StatusBoard>,
}

#[derive(Debug, Serialize)]
pub struct BotStatus {
    pub bot_id: String,
    pub run_id: Uuid,
    pub state: BotState,
    pub terminal: bool,
    pub transitions: Vec<StateChange>,
    pub recent: Vec<ActionLogEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StopRequest {
    /// Account to stop; all of them when absent.
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/stop", post(stop))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tatkal-bot",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn status(State(state): State<Arc<ControlState>>) -> Json<Vec<BotStatus>> {
    let bots = state
        .handles
        .iter()
        .map(|h| {
            let current = h.current_state();
            BotStatus {
                bot_id: h.account().to_string(),
                run_id: h.run_id(),
                state: current,
                terminal: current.is_terminal(),
                transitions: h.recent_transitions(),
                recent: state.board.recent(h.account()),
            }
        })
        .collect();
    Json(bots)
}

pub async fn stop(
    State(state): State<Arc<ControlState>>,
    body: Bytes,
) -> Result<Json<StopResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request: StopRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StopRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("invalid stop request: {}", e),
                }),
            )
        })?
    };
    let targets: Vec<&OrchestratorHandle> = match request.bot_id.as_deref() {
        Some(id) => state.handles.iter().filter(|h| h.account() == id).collect(),
        None => state.handles.iter().collect(),
    };
    if targets.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no bot named {}", request.bot_id.unwrap_or_default()),
            }),
        ));
    }

    let stopped = targets
        .into_iter()
        .map(|h| {
            h.stop();
            h.account().to_string()
        })
        .collect::<Vec<_>>();
    info!("🛑 stop requested for {:?}", stopped);
    Ok(Json(StopResponse { stopped }))
}
