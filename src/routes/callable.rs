//! GET|POST /callable/{id}

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde_json::Value;
use std::sync::Arc;

use crate::AppState;
use crate::error::AppError;
use crate::extract::CallArguments;
use crate::script::ScriptError;
use crate::session::middleware::SessionHandle;

use super::{live_session, script_failure};

/// Invoke a callable exposed by the session.
///
/// String results are returned as HTML, other values as JSON. A callable
/// that returns nothing sends the participant back to the page view.
pub async fn callable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    session: SessionHandle,
    CallArguments(args): CallArguments,
) -> Result<Response, AppError> {
    let (sid, live) = live_session(&state, &session).await?;
    let result = live
        .session
        .lock()
        .await
        .call(&id, args)
        .await
        .map_err(|e| match e {
            ScriptError::UnknownIdentifier(_) => AppError::ResourceNotFound,
            other => script_failure(&live, &sid, other),
        })?;

    Ok(match result {
        None | Some(Value::Null) => Redirect::to("/experiment").into_response(),
        Some(Value::String(s)) if s.is_empty() => Redirect::to("/experiment").into_response(),
        Some(Value::String(html)) => Html(html).into_response(),
        Some(other) => Json(other).into_response(),
    })
}
