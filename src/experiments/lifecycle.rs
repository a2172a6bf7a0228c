//! From "no session" to "running session", or a reason why not.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::AppState;
use crate::audit;
use crate::catalog::{Author, ExperimentDefinition};
use crate::experiments::LiveExperiment;
use crate::script::ScriptError;
use crate::script::config::{
    DB_CRED, ENCRYPTION, ExperimentConfig, METADATA, MORTIMER_SPECIFIC, REQUEST,
};

#[derive(Debug)]
pub enum StartOutcome {
    /// Session created, started and registered.
    Running {
        session_id: String,
        /// Problems worth telling the owner that did not stop the start.
        warnings: Vec<String>,
    },
    /// Protected experiment and no or wrong password.
    PasswordRequired,
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("experiment not found")]
    NotFound,

    #[error("You need to add a script file before you can start an experiment.")]
    ScriptMissing,

    #[error("experiment is not active")]
    Inactive,

    #[error("Error during script import: {0}")]
    Import(ScriptError),

    #[error("Error during experiment generation: {0}")]
    Generation(ScriptError),

    #[error("Error during experiment startup: {0}")]
    Startup(ScriptError),
}

pub const NO_ENCRYPTION_KEY: &str =
    "No personal encryption key is configured for this author; data will not be encrypted.";

/// Run the start sequence for `experiment_id` with the request's values.
///
/// `password` is taken out of `values`; the rest is passed to the script.
pub async fn start_experiment(
    state: &AppState,
    experiment_id: &str,
    mut values: HashMap<String, String>,
) -> Result<StartOutcome, StartError> {
    let definition = state
        .catalog
        .experiment(experiment_id)
        .ok_or(StartError::NotFound)?;

    let Some(script_path) = definition.script_path() else {
        audit::start_rejected(experiment_id, None, "no script");
        return Err(StartError::ScriptMissing);
    };

    if !definition.active {
        audit::start_rejected(experiment_id, None, "inactive");
        return Err(StartError::Inactive);
    }

    let password = values.remove("password");
    if !definition.admits(password.as_deref()) {
        return Ok(StartOutcome::PasswordRequired);
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let params: Map<String, Value> = values
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    let author = state.catalog.author(&definition.author);
    let config = build_config(definition, author, &session_id, &params);

    let mut warnings = Vec::new();
    if author.and_then(|a| a.encryption_key.as_ref()).is_none() {
        tracing::warn!(exp_id = experiment_id, session_id = %session_id, "author has no encryption key");
        warnings.push(NO_ENCRYPTION_KEY.to_string());
    }

    let fail = |err: StartError| {
        tracing::error!(exp_id = experiment_id, session_id = %session_id, error = %err, "experiment start failed");
        audit::start_rejected(experiment_id, Some(&session_id), &err.to_string());
        err
    };

    let module = state
        .loader
        .load(&definition.id, &script_path, &definition.path)
        .await
        .map_err(|e| fail(StartError::Import(e)))?;

    let mut session = module
        .create_session(&config, &params)
        .await
        .map_err(|e| fail(StartError::Generation(e)))?;

    if let Err(e) = session.start().await {
        session.close().await;
        return Err(fail(StartError::Startup(e)));
    }

    state
        .sessions
        .save(&session_id, LiveExperiment::new(&definition.id, session));

    tracing::info!(exp_id = experiment_id, session_id = %session_id, "experiment session started");
    audit::session_started(experiment_id, &session_id);

    Ok(StartOutcome::Running {
        session_id,
        warnings,
    })
}

/// Merge the author's settings, static metadata, author secrets and the
/// request parameters into one configuration.
pub fn build_config(
    definition: &ExperimentDefinition,
    author: Option<&Author>,
    session_id: &str,
    params: &Map<String, Value>,
) -> ExperimentConfig {
    let mut config = ExperimentConfig::from_settings(&definition.settings);

    config.set(METADATA, "title", definition.title.as_str());
    config.set(METADATA, "author", definition.author.as_str());
    config.set(METADATA, "version", definition.version.as_str());
    config.set(METADATA, "exp_id", definition.id.as_str());
    config.set(METADATA, "session_id", session_id);
    config.set(MORTIMER_SPECIFIC, "session_id", session_id);

    if let Some(author) = author {
        if let Some(key) = &author.encryption_key {
            config.set(ENCRYPTION, "key", key.as_str());
        }
        if let Some(Value::Object(cred)) = author.db.as_ref().and_then(|db| serde_json::to_value(db).ok()) {
            config.merge_section(DB_CRED, &cred);
        }
    }

    config.merge_section(REQUEST, params);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DbCredentials;
    use serde_json::json;
    use std::path::PathBuf;

    fn definition() -> ExperimentDefinition {
        ExperimentDefinition {
            id: "stroop".into(),
            title: "Stroop".into(),
            author: "alice".into(),
            version: "1.2".into(),
            active: true,
            public: true,
            password: None,
            path: PathBuf::from("/srv/stroop"),
            script_name: Some("script.py".into()),
            settings: json!({
                "layout": {"theme": "dark"},
                "metadata": {"title": "stale", "language": "de"}
            }),
        }
    }

    fn author() -> Author {
        Author {
            name: "alice".into(),
            access_token: "t".into(),
            encryption_key: Some("fernet-key".into()),
            db: Some(DbCredentials {
                host: "db.local".into(),
                port: 27017,
                db: "alfred".into(),
                collection: "alice_col".into(),
                user: "alice".into(),
                password: "pw".into(),
                use_ssl: false,
                ca_file_path: None,
            }),
        }
    }

    #[test]
    fn test_metadata_overrides_settings() {
        let config = build_config(&definition(), None, "sid-1", &Map::new());
        assert_eq!(config.get(METADATA, "title"), Some(&json!("Stroop")));
        assert_eq!(config.get(METADATA, "language"), Some(&json!("de")));
        assert_eq!(config.get(METADATA, "version"), Some(&json!("1.2")));
        assert_eq!(config.session_id(), Some("sid-1"));
        assert_eq!(config.experiment_id(), Some("stroop"));
        assert_eq!(config.get(MORTIMER_SPECIFIC, "session_id"), Some(&json!("sid-1")));
        assert_eq!(config.get("layout", "theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_author_secrets_included() {
        let config = build_config(&definition(), Some(&author()), "sid-1", &Map::new());
        assert_eq!(config.get(ENCRYPTION, "key"), Some(&json!("fernet-key")));
        assert_eq!(config.get(DB_CRED, "collection"), Some(&json!("alice_col")));
        assert_eq!(config.get(DB_CRED, "port"), Some(&json!(27017)));
    }

    #[test]
    fn test_no_secrets_without_author_key() {
        let mut bare = author();
        bare.encryption_key = None;
        bare.db = None;
        let config = build_config(&definition(), Some(&bare), "sid-1", &Map::new());
        assert!(config.section(ENCRYPTION).is_none());
        assert!(config.section(DB_CRED).is_none());
    }

    #[test]
    fn test_request_params_in_own_section() {
        let mut params = Map::new();
        params.insert("condition".into(), json!("b"));
        let config = build_config(&definition(), None, "sid-1", &params);
        assert_eq!(config.get(REQUEST, "condition"), Some(&json!("b")));
    }
}
