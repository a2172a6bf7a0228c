//! JSON-lines wire format between Mortimer and a script process.
//!
//! Requests: `{"id":7,"op":"render","payload":{...}}`
//! Replies:  `{"id":7,"result":...}` or
//!           `{"id":7,"error":{"kind":"not_found","message":"..."}}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ScriptError;

/// Operations a script process must answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Hello,
    CreateSession,
    Start,
    CurrentPage,
    Update,
    Move,
    Render,
    StaticFile,
    DynamicFile,
    Call,
    Close,
}

/// `id` is serialized first so a line-oriented script can read it cheaply.
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub id: u64,
    pub op: Op,
    pub payload: &'a Value,
}

#[derive(Debug, Deserialize)]
pub struct Reply {
    pub id: u64,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyError {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl Reply {
    pub fn into_result(self) -> Result<Value, ScriptError> {
        match self.error {
            None => Ok(self.result),
            Some(err) if err.kind.as_deref() == Some("not_found") => {
                Err(ScriptError::UnknownIdentifier(err.message))
            }
            Some(err) => Err(ScriptError::Execution(err.message)),
        }
    }
}

pub fn encode(id: u64, op: Op, payload: &Value) -> Result<String, ScriptError> {
    serde_json::to_string(&Request { id, op, payload })
        .map_err(|e| ScriptError::Protocol(e.to_string()))
}

pub fn decode(line: &str) -> Result<Reply, ScriptError> {
    serde_json::from_str(line).map_err(|e| ScriptError::Protocol(format!("{e}: {line}")))
}
