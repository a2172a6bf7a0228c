//! In-memory HTTP session backend.
//!
//! Entries expire `max_age` after their last save. Expired entries are
//! dropped when loaded and by a sweep that runs from `save`, at most once
//! a minute or once per `max_age` when that is shorter. Sessions are lost on restart and are not shared across
//! processes, the same constraint the experiment store has.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{SessionBackend, SessionData};

const SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub struct InMemoryBackend {
    store: DashMap<String, (SessionData, Instant)>,
    max_age: Duration,
    last_sweep: Mutex<Instant>,
}

impl InMemoryBackend {
    /// Backend with a seven day idle lifetime.
    pub fn new() -> Self {
        Self::with_max_age(Duration::from_secs(7 * 24 * 3600))
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            store: DashMap::new(),
            max_age,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn remove_expired(&self) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, (_, saved_at)| saved_at.elapsed() <= self.max_age);
        before.saturating_sub(self.store.len())
    }

    fn sweep_due(&self) -> bool {
        let Ok(mut last) = self.last_sweep.lock() else {
            return false;
        };
        if last.elapsed() < self.max_age.min(SWEEP_PERIOD) {
            return false;
        }
        *last = Instant::now();
        true
    }

    /// Number of stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBackend for InMemoryBackend {
    async fn load(&self, session_id: &str) -> Option<SessionData> {
        let expired = {
            let entry = self.store.get(session_id)?;
            let (data, saved_at) = entry.value();
            if saved_at.elapsed() <= self.max_age {
                return Some(data.clone());
            }
            true
        };
        if expired {
            self.store.remove(session_id);
        }
        None
    }

    async fn save(&self, session_id: &str, data: &SessionData) {
        self.store
            .insert(session_id.to_string(), (data.clone(), Instant::now()));
        if self.sweep_due() {
            let dropped = self.remove_expired();
            if dropped > 0 {
                tracing::debug!(dropped, "expired http sessions swept");
            }
        }
    }

    async fn delete(&self, session_id: &str) {
        self.store.remove(session_id);
    }
}
