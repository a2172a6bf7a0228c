//! GET|POST /start/{expid}

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use std::sync::Arc;

use crate::AppState;
use crate::error::AppError;
use crate::experiments::lifecycle::{self, StartError, StartOutcome};
use crate::experiments::tokens;
use crate::extract::RequestValues;
use crate::session::SID_KEY;
use crate::session::middleware::SessionHandle;

use super::is_owner;

/// Start a new experiment session for the visitor.
///
/// Query and form values are handed to the script as parameters; only
/// `password` is consumed here.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(expid): Path<String>,
    session: SessionHandle,
    RequestValues(values): RequestValues,
) -> Result<Response, AppError> {
    let owner = match state.catalog.experiment(&expid) {
        Some(definition) => is_owner(&*session.data.lock().await, &definition.author),
        None => false,
    };

    match lifecycle::start_experiment(&state, &expid, values).await {
        Ok(StartOutcome::PasswordRequired) => Ok(Html(PASSWORD_PROMPT).into_response()),
        Ok(StartOutcome::Running {
            session_id,
            warnings,
        }) => {
            let mut data = session.data.lock().await;
            data.set(SID_KEY, session_id.into());
            tokens::reset(&mut data);
            if owner {
                for warning in warnings {
                    data.flash("warning", warning);
                }
            }
            Ok(Redirect::to("/experiment").into_response())
        }
        Err(StartError::NotFound) => Err(AppError::ExperimentNotFound),
        Err(StartError::Inactive) => Err(AppError::ExperimentInactive),
        Err(err) if owner => {
            session.data.lock().await.flash("danger", err.to_string());
            Ok(Redirect::to(&format!("/manage/{expid}")).into_response())
        }
        Err(StartError::Import(_)) => Err(AppError::ScriptImportFailure),
        Err(_) => Err(AppError::ScriptFailure),
    }
}

/// Posts back to the requesting URL, so query parameters survive.
const PASSWORD_PROMPT: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Password required</title></head>
<body>
<form method="post">
<p>This experiment is protected. Please enter the password.</p>
<input type="password" name="password" autofocus>
<button type="submit">Start</button>
</form>
</body>
</html>
"#;
