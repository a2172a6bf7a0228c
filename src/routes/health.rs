//! GET / and GET /health

use axum::Json;
use axum::extract::State;
use std::sync::Arc;

use crate::types::HealthResponse;

pub async fn welcome() -> &'static str {
    "Welcome to Mortimer!"
}

/// Health check with live session and loaded script counts.
pub async fn health(State(state): State<Arc<crate::AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        live_sessions: state.sessions.len(),
        loaded_scripts: state.loader.loaded_count(),
    })
}
