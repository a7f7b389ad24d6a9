//! Local HTTP API for driving capture and feeding telemetry readings
//!
//! This module provides a REST API for the wearable shell:
//! - POST /session/arm - Declare the next recording file
//! - POST /session/start - Start streaming a recording
//! - POST /session/stop - Stop and finalize the active recording
//! - GET /session/status - Query session statistics
//! - POST /metrics - Update the latest biometric readings
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ArmSessionRequest, ErrorResponse, StartSessionRequest};
pub use routes::create_router;
pub use state::AppState;
