//! The run's to-do list, as written by `create_plan`.

use std::fmt;

use codeloop_core::error::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Checkbox marker used when the list is rendered into a prompt.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[~]",
            Self::Completed => "[x]",
        }
    }

    /// Lenient parse of what models actually send.
    fn from_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "completed" | "complete" | "done" => Self::Completed,
            "in_progress" | "active" | "started" | "doing" => Self::InProgress,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: TodoStatus,
}

impl TodoItem {
    pub fn new(id: impl Into<String>, description: impl Into<String>, status: TodoStatus) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status,
        }
    }
}

/// Parse `create_plan` arguments into a title and an ordered to-do list.
///
/// Steps may be plain strings or objects with `description` (or `title`,
/// `step`, `text`), an optional `id` and an optional `status`. Missing ids
/// are the 1-based position.
pub fn parse_plan(arguments: &Value) -> Result<(String, Vec<TodoItem>), ToolError> {
    let title = arguments
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Plan")
        .to_string();

    let steps = arguments
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| ToolError::InvalidArguments("'steps' must be an array".into()))?;

    let items = steps
        .iter()
        .enumerate()
        .map(|(i, step)| parse_step(i + 1, step))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((title, items))
}

fn parse_step(position: usize, step: &Value) -> Result<TodoItem, ToolError> {
    match step {
        Value::String(description) => Ok(TodoItem::new(position.to_string(), description.clone(), TodoStatus::Pending)),
        Value::Object(fields) => {
            let description = ["description", "title", "step", "text"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str))
                .ok_or_else(|| ToolError::InvalidArguments(format!("step {position} has no description")))?;
            let id = match fields.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => position.to_string(),
            };
            let status = fields
                .get("status")
                .and_then(Value::as_str)
                .map(TodoStatus::from_loose)
                .unwrap_or_default();
            Ok(TodoItem::new(id, description, status))
        }
        other => Err(ToolError::InvalidArguments(format!(
            "step {position} must be a string or an object, got {other}"
        ))),
    }
}
