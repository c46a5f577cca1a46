//! WebAPI - HTTP façade over the engine
//!
//! ## Responsibilities
//!
//! - Expose the inbound calls (capture, refresh, probe) to UI collaborators
//! - Status and stream locator queries
//! - Engine events over WebSocket

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        device_connected: state.supervisor.is_connected(),
    };

    Json(response)
}
