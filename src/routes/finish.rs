//! GET|POST /finish

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::AppState;
use crate::audit;
use crate::error::AppError;
use crate::experiments::tokens::PAGE_TOKENS_KEY;
use crate::session::SID_KEY;
use crate::session::middleware::SessionHandle;

/// End the participant's run: drop the record, close the session and
/// unbind it from the HTTP session. Finishing twice is harmless.
pub async fn finish(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
) -> Result<Response, AppError> {
    let sid = {
        let mut data = session.data.lock().await;
        data.remove(PAGE_TOKENS_KEY);
        data.remove(SID_KEY)
    };

    let Some(sid) = sid.as_ref().and_then(|v| v.as_str()) else {
        return Ok("No experiment session to finish.".into_response());
    };

    if let Some(live) = state.sessions.remove(sid) {
        live.session.lock().await.close().await;
        tracing::info!(exp_id = %live.experiment_id, session_id = sid, "experiment session finished");
        audit::session_finished(&live.experiment_id, sid);
    }

    Ok("Thank you for participating.".into_response())
}
