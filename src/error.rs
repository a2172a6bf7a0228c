//! Application error types with Axum response mapping.
//!
//! Each variant maps to a specific HTTP status + JSON body. Failures that
//! originate in experiment scripts only ever expose a fixed message; the
//! details go to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::experiments::navigation::NavigationError;
use crate::experiments::store::SessionNotFound;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Experiment not found")]
    ExperimentNotFound,

    #[error("Experiment is not active")]
    ExperimentInactive,

    #[error("No running experiment session")]
    SessionNotFound,

    #[error("Invalid navigation request: {0}")]
    InvalidNavigationRequest(String),

    #[error("Resource not found")]
    ResourceNotFound,

    #[error("Experiment could not be loaded")]
    ScriptImportFailure,

    #[error("Experiment failed")]
    ScriptFailure,

    #[error("Owner login required")]
    NotOwner,

    #[error("CSRF validation failed")]
    CsrfFailed,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ExperimentNotFound | AppError::ResourceNotFound => StatusCode::NOT_FOUND,
            AppError::ExperimentInactive | AppError::NotOwner | AppError::CsrfFailed => {
                StatusCode::FORBIDDEN
            }
            AppError::SessionNotFound => StatusCode::PRECONDITION_FAILED,
            AppError::InvalidNavigationRequest(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::ScriptImportFailure | AppError::ScriptFailure | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            AppError::InvalidNavigationRequest(msg) => json!({
                "error": "Invalid navigation request",
                "message": msg
            }),
            AppError::CsrfFailed => json!({
                "error": "CSRF validation failed",
                "message": "Missing X-Mortimer-CSRF header"
            }),
            AppError::BadRequest(msg) => json!({"error": msg}),
            AppError::Internal(_) => json!({"error": "Internal error"}),
            other => json!({"error": other.to_string()}),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(msg) = &self {
            tracing::error!(error = %msg, "internal error");
        }
        (self.status(), axum::Json(self.body())).into_response()
    }
}

impl From<SessionNotFound> for AppError {
    fn from(_: SessionNotFound) -> Self {
        AppError::SessionNotFound
    }
}

impl From<NavigationError> for AppError {
    fn from(err: NavigationError) -> Self {
        AppError::InvalidNavigationRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_to_json(err: AppError) -> (StatusCode, serde_json::Value) {
        (err.status(), err.body())
    }

    #[test]
    fn test_experiment_not_found() {
        let (status, body) = error_to_json(AppError::ExperimentNotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Experiment not found");
    }

    #[test]
    fn test_inactive() {
        let (status, _) = error_to_json(AppError::ExperimentInactive);
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_session_not_found_is_412() {
        let (status, body) = error_to_json(SessionNotFound("sid".into()).into());
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["error"], "No running experiment session");
    }

    #[test]
    fn test_navigation_error() {
        let err: AppError = NavigationError::BadPosition("1..2".into()).into();
        let (status, body) = error_to_json(err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid navigation request");
        assert!(body["message"].as_str().unwrap().contains("1..2"));
    }

    #[test]
    fn test_script_errors_are_generic() {
        let (status, body) = error_to_json(AppError::ScriptFailure);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Experiment failed");

        let (status, body) = error_to_json(AppError::ScriptImportFailure);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Experiment could not be loaded");
    }

    #[test]
    fn test_internal_hides_message() {
        let (status, body) = error_to_json(AppError::Internal("db at 10.0.0.1 down".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal error");
    }

    #[test]
    fn test_csrf_failed() {
        let (status, body) = error_to_json(AppError::CsrfFailed);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Missing X-Mortimer-CSRF header");
    }

    #[test]
    fn test_bad_request() {
        let (status, body) = error_to_json(AppError::BadRequest("Missing field".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing field");
    }
}
