use super::state::AppState;
use crate::session::{SessionError, SessionStats};
use crate::telemetry::Readings;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ArmSessionRequest {
    /// Recording file the next session will stream
    pub path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Recording file; falls back to the armed location when omitted
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn session_error_response(e: SessionError) -> Response {
    let status = match &e {
        SessionError::AlreadyActive(_) | SessionError::NotArmable(_) => StatusCode::CONFLICT,
        SessionError::NoLocation => StatusCode::BAD_REQUEST,
        SessionError::Connect(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, e)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/arm
pub async fn arm_session(
    State(state): State<AppState>,
    Json(req): Json<ArmSessionRequest>,
) -> impl IntoResponse {
    match state.controller.arm(req.path).await {
        Ok(()) => (StatusCode::OK, Json(state.controller.status())).into_response(),
        Err(e) => session_error_response(e),
    }
}

/// POST /session/start
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let result = match req.path {
        Some(path) => state.controller.start(path).await,
        None => state.controller.start_armed().await,
    };

    match result {
        Ok(stats) => {
            info!(
                "Capture started via API: {}",
                stats.session_id.as_deref().unwrap_or_default()
            );
            (StatusCode::OK, Json(stats)).into_response()
        }
        Err(e) => {
            error!("Failed to start capture: {}", e);
            session_error_response(e)
        }
    }
}

/// POST /session/stop
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.stop().await {
        Some(stats) => (StatusCode::OK, Json::<SessionStats>(stats)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No active capture session"),
    }
}

/// GET /session/status
pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.status()))
}

/// POST /metrics
/// Merge a partial set of readings into the latest known values
pub async fn record_metrics(
    State(state): State<AppState>,
    Json(update): Json<Readings>,
) -> impl IntoResponse {
    state.metrics.update(&update).await;
    (StatusCode::OK, Json(state.metrics.readings().await))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
