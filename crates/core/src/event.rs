//! Outward run events — the compatibility boundary with the UI layer.
//!
//! Every event serializes as
//! `{"type": ..., "data": ..., "callId"?: ..., "name"?: ...}`.
//! The orchestrator sends these through an `mpsc` channel; whoever renders
//! the transcript owns the receiver.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The event discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    Text,
    FunctionCall,
    FunctionResult,
    Error,
    Done,
    Continuation,
}

/// A single event emitted by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    #[serde(rename = "type")]
    pub kind: RunEventKind,

    pub data: Value,

    #[serde(rename = "callId", default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RunEvent {
    fn bare(kind: RunEventKind, data: Value) -> Self {
        Self {
            kind,
            data,
            call_id: None,
            name: None,
        }
    }

    /// Streamed assistant text, or a user-visible notice appended to the
    /// transcript.
    pub fn text(text: impl Into<String>) -> Self {
        Self::bare(RunEventKind::Text, Value::String(text.into()))
    }

    pub fn function_call(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            kind: RunEventKind::FunctionCall,
            data: arguments,
            call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn function_result(call_id: impl Into<String>, name: impl Into<String>, response: Value) -> Self {
        Self {
            kind: RunEventKind::FunctionResult,
            data: response,
            call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::bare(RunEventKind::Error, Value::String(message.into()))
    }

    pub fn done() -> Self {
        Self::bare(RunEventKind::Done, Value::Null)
    }

    /// Announces that a fresh continuation session is starting.
    pub fn continuation(count: u32, max: u32) -> Self {
        Self::bare(
            RunEventKind::Continuation,
            serde_json::json!({ "count": count, "max": max }),
        )
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, RunEventKind::Done | RunEventKind::Error)
    }

    /// The text payload, for `text` and `error` events.
    pub fn as_text(&self) -> Option<&str> {
        self.data.as_str()
    }
}
