//! CSRF validation: require `X-Mortimer-CSRF: 1` on owner actions.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;

pub const CSRF_HEADER: &str = "x-mortimer-csrf";

/// Axum middleware that requires the `X-Mortimer-CSRF: 1` header.
pub async fn require_csrf(req: Request, next: Next) -> Result<Response, impl IntoResponse> {
    if req.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok()) != Some("1") {
        return Err(AppError::CsrfFailed);
    }
    Ok(next.run(req).await)
}
