//! Participant-facing experiment sessions: the store, the start
//! lifecycle, page tokens and navigation parsing.

pub mod lifecycle;
pub mod navigation;
pub mod store;
pub mod tokens;

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::script::ExperimentSession;
use store::ExperimentScoped;

/// A running session as kept in the store.
///
/// The store only holds the handle; callers lock the session after the
/// store lookup has returned, so script code never runs under a store lock.
#[derive(Clone)]
pub struct LiveExperiment {
    pub experiment_id: String,
    pub session: Arc<Mutex<Box<dyn ExperimentSession>>>,
}

impl LiveExperiment {
    pub fn new(experiment_id: impl Into<String>, session: Box<dyn ExperimentSession>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            session: Arc::new(Mutex::new(session)),
        }
    }
}

impl ExperimentScoped for LiveExperiment {
    fn experiment_id(&self) -> Option<&str> {
        Some(&self.experiment_id)
    }
}
