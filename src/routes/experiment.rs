//! GET|POST /experiment

use axum::extract::State;
use axum::response::{Html, IntoResponse, Redirect, Response};
use std::sync::Arc;

use crate::AppState;
use crate::error::AppError;
use crate::experiments::navigation::NavigationRequest;
use crate::experiments::tokens;
use crate::extract::RequestValues;
use crate::session::middleware::SessionHandle;

use super::{live_session, script_failure};

/// Render the current page with a fresh page token.
pub async fn show(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
) -> Result<Response, AppError> {
    let (sid, live) = live_session(&state, &session).await?;
    let mut experiment = live.session.lock().await;

    let page = experiment
        .current_page()
        .await
        .map_err(|e| script_failure(&live, &sid, e))?;
    let token = tokens::issue(&mut *session.data.lock().await, &page, &sid);

    let html = experiment
        .render(&token)
        .await
        .map_err(|e| script_failure(&live, &sid, e))?;
    Ok(Html(html).into_response())
}

/// Apply a page submission and redirect back to the page view.
///
/// A missing, stale or replayed page token redirects without applying
/// anything.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
    RequestValues(values): RequestValues,
) -> Result<Response, AppError> {
    let (sid, live) = live_session(&state, &session).await?;
    let submitted = values.get("page_token").cloned();
    let request = NavigationRequest::parse(values);

    let mut experiment = live.session.lock().await;
    let page = experiment
        .current_page()
        .await
        .map_err(|e| script_failure(&live, &sid, e))?;

    let accepted = tokens::consume(
        &mut *session.data.lock().await,
        &page,
        &sid,
        submitted.as_deref(),
    );
    if !accepted {
        tracing::debug!(exp_id = %live.experiment_id, session_id = %sid, page = %page, "stale page token");
        return Ok(Redirect::to("/experiment").into_response());
    }

    let request = request.map_err(|e| {
        tracing::warn!(exp_id = %live.experiment_id, session_id = %sid, error = %e, "invalid navigation request");
        AppError::from(e)
    })?;

    experiment
        .update_with_user_input(request.data)
        .await
        .map_err(|e| script_failure(&live, &sid, e))?;

    if let Some(movement) = request.movement {
        experiment
            .navigate(movement)
            .await
            .map_err(|e| script_failure(&live, &sid, e))?;
    }

    Ok(Redirect::to("/experiment").into_response())
}
