//! Shared request/response DTOs.

use serde::{Deserialize, Serialize};

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub live_sessions: usize,
    pub loaded_scripts: usize,
}

/// POST /owner/login form.
#[derive(Debug, Deserialize)]
pub struct OwnerLogin {
    pub author: String,
    pub token: String,
}

/// GET /manage/{expid} response.
#[derive(Debug, Serialize)]
pub struct ExperimentStatus {
    pub id: String,
    pub title: String,
    pub version: String,
    pub active: bool,
    pub public: bool,
    pub has_script: bool,
    pub script_loaded: bool,
    pub live_sessions: usize,
    pub flashes: Vec<serde_json::Value>,
}

/// Generic success response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}
