//! Single-use page tokens.
//!
//! Each rendered page gets a fresh token, kept in the HTTP session under
//! `<page>:<sid>`. A navigation POST is honored only if it presents exactly
//! that token, which is removed on first use. Rendering the same page again
//! replaces the outstanding token.

use serde_json::{Map, Value};

use crate::session::SessionData;

pub const PAGE_TOKENS_KEY: &str = "page_tokens";

fn registry_key(page: &str, sid: &str) -> String {
    format!("{page}:{sid}")
}

/// Issue and remember a token for `page` of session `sid`.
pub fn issue(data: &mut SessionData, page: &str, sid: &str) -> String {
    let token = uuid::Uuid::new_v4().to_string();
    let mut registry = match data.remove(PAGE_TOKENS_KEY) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    registry.insert(registry_key(page, sid), Value::String(token.clone()));
    data.set(PAGE_TOKENS_KEY, Value::Object(registry));
    token
}

/// Consume the token for `page` of `sid` if `submitted` matches it.
///
/// A mismatch leaves the outstanding token in place.
pub fn consume(data: &mut SessionData, page: &str, sid: &str, submitted: Option<&str>) -> bool {
    let Some(submitted) = submitted else {
        return false;
    };
    let key = registry_key(page, sid);
    let Some(Value::Object(registry)) = data.data.get_mut(PAGE_TOKENS_KEY) else {
        return false;
    };
    if registry.get(&key).and_then(Value::as_str) != Some(submitted) {
        return false;
    }
    registry.remove(&key);
    true
}

/// Forget every outstanding token.
pub fn reset(data: &mut SessionData) {
    data.set(PAGE_TOKENS_KEY, Value::Object(Map::new()));
}
