//! Structured lifecycle events for experiment sessions.
//!
//! Emitted as one JSON object per event on the `mortimer::audit` target, so
//! a log pipeline can follow a participant from start to eviction without
//! parsing free-form messages.

use serde_json::{Value, json};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ACTIVITY_START: &str = "session_start";
pub const ACTIVITY_FINISH: &str = "session_finish";
pub const ACTIVITY_EVICT: &str = "session_evict";
pub const ACTIVITY_REJECT: &str = "start_rejected";
pub const ACTIVITY_SCRIPT_LOAD: &str = "script_load";

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn event(activity: &str, success: bool, exp_id: Option<&str>, session_id: Option<&str>, message: &str) -> Value {
    let mut event = json!({
        "activity": activity,
        "status": if success { "success" } else { "failure" },
        "time": now_millis(),
        "product": {
            "name": "mortimer",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "message": message,
    });
    if let Some(exp_id) = exp_id {
        event["exp_id"] = json!(exp_id);
    }
    if let Some(session_id) = session_id {
        event["session_id"] = json!(session_id);
    }
    event
}

fn emit(event: &Value) {
    if let Ok(line) = serde_json::to_string(event) {
        tracing::info!(target: "mortimer::audit", "{}", line);
    }
}

pub fn session_started(exp_id: &str, session_id: &str) {
    emit(&event(ACTIVITY_START, true, Some(exp_id), Some(session_id), "experiment session started"));
}

pub fn session_finished(exp_id: &str, session_id: &str) {
    emit(&event(ACTIVITY_FINISH, true, Some(exp_id), Some(session_id), "experiment session finished"));
}

pub fn session_evicted(exp_id: Option<&str>, session_id: &str, idle_secs: u64) {
    emit(&eviction(exp_id, session_id, idle_secs));
}

fn eviction(exp_id: Option<&str>, session_id: &str, idle_secs: u64) -> Value {
    let mut e = event(ACTIVITY_EVICT, true, exp_id, Some(session_id), "idle session evicted");
    e["idle_secs"] = json!(idle_secs);
    e
}

/// A start attempt that did not produce a running session.
pub fn start_rejected(exp_id: &str, session_id: Option<&str>, reason: &str) {
    emit(&event(ACTIVITY_REJECT, false, Some(exp_id), session_id, reason));
}

pub fn script_loaded(exp_id: &str) {
    emit(&event(ACTIVITY_SCRIPT_LOAD, true, Some(exp_id), None, "script module loaded"));
}
