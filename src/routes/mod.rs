//! HTTP route handlers.

pub mod callable;
pub mod experiment;
pub mod files;
pub mod finish;
pub mod health;
pub mod owner;
pub mod start;

use crate::AppState;
use crate::error::AppError;
use crate::experiments::LiveExperiment;
use crate::script::ScriptError;
use crate::session::middleware::SessionHandle;
use crate::session::{OWNER_KEY, SID_KEY, SessionData};

/// Resolve the participant's running session through the HTTP session.
///
/// No `sid`, or a `sid` the store no longer knows, is a precondition failure.
pub(crate) async fn live_session(
    state: &AppState,
    session: &SessionHandle,
) -> Result<(String, LiveExperiment), AppError> {
    let sid = session
        .data
        .lock()
        .await
        .get_str(SID_KEY)
        .map(String::from)
        .ok_or(AppError::SessionNotFound)?;
    let live = state.sessions.get(&sid)?;
    Ok((sid, live))
}

/// Whether the HTTP session belongs to the author `author`.
pub(crate) fn is_owner(data: &SessionData, author: &str) -> bool {
    data.get_str(OWNER_KEY) == Some(author)
}

/// Log a failure raised by a live session and hide its details.
pub(crate) fn script_failure(live: &LiveExperiment, sid: &str, err: ScriptError) -> AppError {
    tracing::error!(exp_id = %live.experiment_id, session_id = sid, error = %err, "experiment script failed");
    AppError::ScriptFailure
}
