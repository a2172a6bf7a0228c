//! Process-wide module cache.
//!
//! A script is executed at most once per identifier. Concurrent first loads
//! of the same identifier share one execution; a failed load leaves the
//! slot empty so the next visitor retries. A module whose process has died
//! is evicted on the next load and the script runs again.

use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

use super::{LoadRequest, ScriptError, ScriptModule, ScriptRuntime};

type Slot = Arc<OnceCell<Arc<dyn ScriptModule>>>;

pub struct ScriptLoader {
    runtime: Arc<dyn ScriptRuntime>,
    modules: DashMap<String, Slot>,
}

impl ScriptLoader {
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self {
            runtime,
            modules: DashMap::new(),
        }
    }

    /// Return the module cached under `identifier`, executing the script
    /// on first use.
    pub async fn load(
        &self,
        identifier: &str,
        script_path: &Path,
        resource_dir: &Path,
    ) -> Result<Arc<dyn ScriptModule>, ScriptError> {
        let slot = self.live_slot(identifier);

        let module = slot
            .get_or_try_init(|| async {
                if !script_path.is_file() {
                    return Err(ScriptError::Import(format!(
                        "script not found: {}",
                        script_path.display()
                    )));
                }
                let request = LoadRequest {
                    identifier: identifier.to_string(),
                    script_path: script_path.to_path_buf(),
                    resource_dir: resource_dir.to_path_buf(),
                };
                let module = self.runtime.load(&request).await?;
                tracing::info!(exp_id = identifier, script = %script_path.display(), "script loaded");
                crate::audit::script_loaded(identifier);
                Ok(module)
            })
            .await?;

        Ok(module.clone())
    }

    /// The slot for `identifier`, replaced by an empty one when it holds
    /// a dead module. Cloned out so no map shard stays locked across an
    /// await.
    fn live_slot(&self, identifier: &str) -> Slot {
        let mut entry = self.modules.entry(identifier.to_string()).or_default();
        if entry.value().get().is_some_and(|module| !module.is_alive()) {
            warn!(exp_id = identifier, "cached script module is dead, reloading");
            *entry.value_mut() = Slot::default();
        }
        entry.value().clone()
    }

    pub fn is_loaded(&self, identifier: &str) -> bool {
        self.modules
            .get(identifier)
            .is_some_and(|slot| holds_live_module(&slot))
    }

    /// Number of successfully loaded modules still alive.
    pub fn loaded_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|e| holds_live_module(e.value()))
            .count()
    }
}

fn holds_live_module(slot: &Slot) -> bool {
    slot.get().is_some_and(|module| module.is_alive())
}
