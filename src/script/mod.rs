//! Experiment scripts: the runtime seam, the module cache, and the
//! process-backed runtime.
//!
//! A script is untrusted author code. A [`ScriptRuntime`] executes it once
//! into a [`ScriptModule`]; the module's factory produces one
//! [`ExperimentSession`] per participant.

pub mod config;
pub mod loader;
pub mod process;
pub mod protocol;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use config::ExperimentConfig;
pub use loader::ScriptLoader;

/// Failure raised by script code or by the runtime hosting it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
    #[error("script import failed: {0}")]
    Import(String),

    #[error("script raised an error: {0}")]
    Execution(String),

    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("script did not answer within {0:?}")]
    Timeout(Duration),

    #[error("script process is gone")]
    ProcessGone,

    #[error("malformed script reply: {0}")]
    Protocol(String),
}

/// What the loader hands to a runtime.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Stable per-experiment identifier, the cache key.
    pub identifier: String,
    /// Entry script.
    pub script_path: PathBuf,
    /// The experiment's resource directory, injected into the script.
    pub resource_dir: PathBuf,
}

/// One navigation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum Movement {
    Forward,
    Backward,
    Jump { position: Vec<usize> },
}

/// A file-backed resource resolved by a session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticFile {
    pub path: PathBuf,
    pub content_type: String,
}

/// A generated resource resolved by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicFile {
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Executes scripts into modules.
#[async_trait]
pub trait ScriptRuntime: Send + Sync {
    async fn load(&self, request: &LoadRequest) -> Result<Arc<dyn ScriptModule>, ScriptError>;
}

/// A loaded script, shared by every participant of one experiment.
#[async_trait]
pub trait ScriptModule: Send + Sync {
    /// The session factory. `params` are the request-supplied values.
    async fn create_session(
        &self,
        config: &ExperimentConfig,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Box<dyn ExperimentSession>, ScriptError>;

    /// Whether the module can still serve requests. A dead module is
    /// dropped from the loader cache and the script is executed again.
    fn is_alive(&self) -> bool {
        true
    }
}

/// One participant's live run of an experiment.
#[async_trait]
pub trait ExperimentSession: Send {
    /// Start-lifecycle hook, called once before the session is registered.
    async fn start(&mut self) -> Result<(), ScriptError>;

    /// Identifier of the page currently shown.
    async fn current_page(&mut self) -> Result<String, ScriptError>;

    /// Apply submitted form fields to the current page.
    async fn update_with_user_input(
        &mut self,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ScriptError>;

    async fn navigate(&mut self, movement: Movement) -> Result<(), ScriptError>;

    /// Render the current page, embedding `page_token` in its form.
    async fn render(&mut self, page_token: &str) -> Result<String, ScriptError>;

    async fn static_file(&mut self, identifier: &str) -> Result<StaticFile, ScriptError>;

    async fn dynamic_file(&mut self, identifier: &str) -> Result<DynamicFile, ScriptError>;

    /// Invoke an exposed callable. `Ok(None)` means it returned nothing.
    async fn call(
        &mut self,
        identifier: &str,
        args: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, ScriptError>;

    /// Explicit end of the run.
    async fn close(&mut self) {}
}
