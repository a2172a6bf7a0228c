//! Server-side HTTP session.
//!
//! The browser only holds a signed id. The data behind it carries the
//! participant's experiment `sid`, the page-token registry, owner login
//! and pending flash messages.

pub mod cookie;
pub mod memory;
pub mod middleware;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key of the experiment session id inside the HTTP session.
pub const SID_KEY: &str = "sid";
/// Key of the logged-in owner (author name).
pub const OWNER_KEY: &str = "owner";
/// Key of the pending flash messages.
pub const FLASHES_KEY: &str = "flashes";

/// Session data stored server-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    #[serde(flatten)]
    pub data: HashMap<String, serde_json::Value>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Queue a message for the owner's next status request.
    pub fn flash(&mut self, category: &str, message: impl Into<String>) {
        let entry = serde_json::json!({ "category": category, "message": message.into() });
        match self.data.get_mut(FLASHES_KEY) {
            Some(serde_json::Value::Array(list)) => list.push(entry),
            _ => {
                self.data
                    .insert(FLASHES_KEY.into(), serde_json::Value::Array(vec![entry]));
            }
        }
    }

    /// Remove and return all pending flash messages.
    pub fn take_flashes(&mut self) -> Vec<serde_json::Value> {
        match self.data.remove(FLASHES_KEY) {
            Some(serde_json::Value::Array(list)) => list,
            _ => Vec::new(),
        }
    }
}

/// Pluggable storage for HTTP session data.
///
/// Implementations must be `Send + Sync` for use in Axum's async handlers.
pub trait SessionBackend: Send + Sync {
    /// Load session data by id. Returns `None` if not found or expired.
    fn load(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Option<SessionData>> + Send;

    /// Save session data.
    fn save(
        &self,
        session_id: &str,
        data: &SessionData,
    ) -> impl std::future::Future<Output = ()> + Send;

    /// Delete a session.
    fn delete(&self, session_id: &str) -> impl std::future::Future<Output = ()> + Send;
}
