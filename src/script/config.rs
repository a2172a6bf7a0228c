//! Sectioned configuration handed to a script's session factory.

use serde::Serialize;
use serde_json::{Map, Value};

pub const METADATA: &str = "metadata";
pub const MORTIMER_SPECIFIC: &str = "mortimer_specific";
pub const ENCRYPTION: &str = "encryption";
pub const DB_CRED: &str = "db_cred";
pub const REQUEST: &str = "request";

/// `section -> key -> value`. Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExperimentConfig {
    sections: Map<String, Value>,
}

impl ExperimentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an author's settings blob. Only object-valued top-level
    /// entries are sections; anything else is dropped.
    pub fn from_settings(settings: &Value) -> Self {
        let sections = settings
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| v.is_object())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Self { sections }
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<Value>) {
        let entry = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value.into());
        }
    }

    /// Overlay every key of `values` onto `section`.
    pub fn merge_section(&mut self, section: &str, values: &Map<String, Value>) {
        for (key, value) in values {
            self.set(section, key, value.clone());
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section)?.get(key)
    }

    pub fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.sections.get(name)?.as_object()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.get(METADATA, "session_id").and_then(Value::as_str)
    }

    pub fn experiment_id(&self) -> Option<&str> {
        self.get(METADATA, "exp_id").and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.sections.clone())
    }
}
