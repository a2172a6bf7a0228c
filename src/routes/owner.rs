//! POST /owner/login, POST /owner/logout, GET /manage/{expid}

use axum::extract::{Path, State};
use axum::{Form, Json};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::AppState;
use crate::error::AppError;
use crate::session::OWNER_KEY;
use crate::session::middleware::SessionHandle;
use crate::types::{ExperimentStatus, OwnerLogin, SuccessResponse};

use super::is_owner;

/// Log in as an author with their access token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
    Form(form): Form<OwnerLogin>,
) -> Result<Json<SuccessResponse>, AppError> {
    let author = state
        .catalog
        .author(&form.author)
        .filter(|a| constant_time_eq(a.access_token.as_bytes(), form.token.as_bytes()))
        .ok_or_else(|| {
            tracing::warn!(author = %form.author, "owner login rejected");
            AppError::NotOwner
        })?;

    session
        .data
        .lock()
        .await
        .set(OWNER_KEY, author.name.clone().into());
    tracing::info!(author = %author.name, "owner logged in");

    Ok(Json(SuccessResponse { success: true }))
}

/// Drop the whole HTTP session and expire its cookie.
pub async fn logout(session: SessionHandle) -> Json<SuccessResponse> {
    session.destroy().await;
    Json(SuccessResponse { success: true })
}

/// Status of one experiment for its author. Pending flash messages are
/// consumed by this request.
pub async fn manage(
    State(state): State<Arc<AppState>>,
    Path(expid): Path<String>,
    session: SessionHandle,
) -> Result<Json<ExperimentStatus>, AppError> {
    let definition = state
        .catalog
        .experiment(&expid)
        .ok_or(AppError::ExperimentNotFound)?;

    let flashes = {
        let mut data = session.data.lock().await;
        if !is_owner(&data, &definition.author) {
            return Err(AppError::NotOwner);
        }
        data.take_flashes()
    };

    Ok(Json(ExperimentStatus {
        id: definition.id.clone(),
        title: definition.title.clone(),
        version: definition.version.clone(),
        active: definition.active,
        public: definition.public,
        has_script: definition.script_path().is_some(),
        script_loaded: state.loader.is_loaded(&definition.id),
        live_sessions: state
            .sessions
            .count_where(|live| live.experiment_id == definition.id),
        flashes,
    }))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
