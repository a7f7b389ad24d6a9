use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Capture control
        .route("/session/arm", post(handlers::arm_session))
        .route("/session/start", post(handlers::start_session))
        .route("/session/stop", post(handlers::stop_session))
        .route("/session/status", get(handlers::session_status))
        // Sample sources
        .route("/metrics", post(handlers::record_metrics))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
