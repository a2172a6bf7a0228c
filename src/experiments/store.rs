//! In-memory session store with idle eviction.
//!
//! Every operation first sweeps out records idle for at least `timeout`
//! seconds. `get` renews the record it returns. The map is sharded
//! (`DashMap`), so sessions on different shards do not contend.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of unix timestamps in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Stored values that know which experiment they belong to. Evictions
/// are recorded under that experiment.
pub trait ExperimentScoped {
    fn experiment_id(&self) -> Option<&str> {
        None
    }
}

/// Returned by [`SessionStore::get`] for unknown or expired ids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no live session {0}")]
pub struct SessionNotFound(pub String);

struct SessionRecord<V> {
    last_access: u64,
    value: V,
}

pub struct SessionStore<V> {
    records: DashMap<String, SessionRecord<V>>,
    timeout: u64,
    clock: Arc<dyn Clock>,
}

impl<V: Clone + ExperimentScoped> SessionStore<V> {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            timeout: timeout.as_secs(),
            clock,
        }
    }

    /// Insert or replace `id`, stamped with the current time.
    pub fn save(&self, id: &str, value: V) {
        self.remove_outdated();
        self.records.insert(
            id.to_string(),
            SessionRecord {
                last_access: self.clock.now(),
                value,
            },
        );
    }

    /// Fetch `id` and renew its idle clock.
    pub fn get(&self, id: &str) -> Result<V, SessionNotFound> {
        self.remove_outdated();
        let now = self.clock.now();
        match self.records.get_mut(id) {
            Some(mut record) => {
                record.last_access = now;
                Ok(record.value.clone())
            }
            None => {
                tracing::debug!(session_id = id, live = self.records.len(), "unknown experiment session");
                Err(SessionNotFound(id.to_string()))
            }
        }
    }

    /// Delete `id` if present and hand back its value.
    pub fn remove(&self, id: &str) -> Option<V> {
        self.remove_outdated();
        self.records.remove(id).map(|(_, record)| record.value)
    }

    /// Drop every record idle for `timeout` seconds or longer.
    pub fn remove_outdated(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|id, record| {
            let idle = now.saturating_sub(record.last_access);
            if idle >= self.timeout {
                let exp_id = record.value.experiment_id();
                tracing::info!(exp_id, session_id = %id, last_access = record.last_access, "evicting idle experiment session");
                crate::audit::session_evicted(exp_id, id, idle);
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of live records whose value satisfies `predicate`.
    pub fn count_where(&self, predicate: impl Fn(&V) -> bool) -> usize {
        self.records.iter().filter(|r| predicate(&r.value)).count()
    }
}

impl<V: Clone + ExperimentScoped + Send + Sync + 'static> SessionStore<V> {
    /// Sweep periodically in addition to the sweep every access performs.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let evicted = self.remove_outdated();
                if evicted > 0 {
                    tracing::info!(evicted, "periodic sweep");
                }
            }
        })
    }
}
