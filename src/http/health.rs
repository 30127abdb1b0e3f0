// ABOUTME: GET /health — liveness plus enough ambient state to diagnose a stuck deployment
// ABOUTME: Never requires auth; reachable even while UNCONFIGURED

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use hub_core::models::system_config::AppMode;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    app_mode: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let app_mode = state.mode_manager.current_mode().await.unwrap_or(AppMode::Unconfigured);
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        app_mode: app_mode.as_str(),
    })
}
