//! GET /staticfile/{id} and GET /dynamicfile/{id}

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::AppState;
use crate::error::AppError;
use crate::experiments::LiveExperiment;
use crate::script::ScriptError;
use crate::session::middleware::SessionHandle;

use super::{live_session, script_failure};

/// Stream a file the session maps `id` to.
pub async fn static_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    session: SessionHandle,
) -> Result<Response, AppError> {
    let (sid, live) = live_session(&state, &session).await?;
    let file = live
        .session
        .lock()
        .await
        .static_file(&id)
        .await
        .map_err(|e| resource_error(&live, &sid, e))?;

    let unreadable = |e: std::io::Error| {
        tracing::warn!(exp_id = %live.experiment_id, session_id = %sid, path = %file.path.display(), error = %e, "static file unreadable");
        AppError::ResourceNotFound
    };
    let handle = File::open(&file.path).await.map_err(unreadable)?;
    let metadata = handle.metadata().await.map_err(unreadable)?;
    if !metadata.is_file() {
        return Err(unreadable(std::io::Error::other("not a regular file")));
    }

    let headers = [
        (header::CONTENT_TYPE, file.content_type.clone()),
        (header::CONTENT_LENGTH, metadata.len().to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(handle))).into_response())
}

/// Serve content the session generates for `id`.
pub async fn dynamic_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    session: SessionHandle,
) -> Result<Response, AppError> {
    let (sid, live) = live_session(&state, &session).await?;
    let file = live
        .session
        .lock()
        .await
        .dynamic_file(&id)
        .await
        .map_err(|e| resource_error(&live, &sid, e))?;

    Ok(([(header::CONTENT_TYPE, file.content_type)], file.content).into_response())
}

fn resource_error(live: &LiveExperiment, sid: &str, err: ScriptError) -> AppError {
    match err {
        ScriptError::UnknownIdentifier(id) => {
            tracing::debug!(exp_id = %live.experiment_id, session_id = sid, resource = %id, "unknown resource");
            AppError::ResourceNotFound
        }
        other => script_failure(live, sid, other),
    }
}
