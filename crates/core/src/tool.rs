//! Tool catalog and the external tool implementation contract.
//!
//! The catalog is closed: exactly ten tool names exist. The loop only needs
//! the call/response contract of each; concrete implementations (filesystem,
//! shell, search) plug in through [`Tool`] and [`ToolRegistry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ToolError;

/// The fixed tool catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ReadFile,
    PeekFile,
    WriteFile,
    ListFiles,
    SearchCode,
    ExecuteCommand,
    RunTests,
    CreatePlan,
    TaskComplete,
    WebSearch,
}

impl ToolName {
    pub const ALL: [ToolName; 10] = [
        Self::ReadFile,
        Self::PeekFile,
        Self::WriteFile,
        Self::ListFiles,
        Self::SearchCode,
        Self::ExecuteCommand,
        Self::RunTests,
        Self::CreatePlan,
        Self::TaskComplete,
        Self::WebSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::PeekFile => "peek_file",
            Self::WriteFile => "write_file",
            Self::ListFiles => "list_files",
            Self::SearchCode => "search_code",
            Self::ExecuteCommand => "execute_command",
            Self::RunTests => "run_tests",
            Self::CreatePlan => "create_plan",
            Self::TaskComplete => "task_complete",
            Self::WebSearch => "web_search",
        }
    }

    /// Dependent tools must not start while file approvals are pending.
    pub fn is_dependent(&self) -> bool {
        matches!(self, Self::ExecuteCommand | Self::RunTests)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ToolError::NotFound(s.to_string()))
    }
}

/// Lifecycle of a single tool call within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

/// A request from the model to invoke a catalog operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID within a run (matches the LLM's tool call id)
    pub id: String,

    /// Name as sent by the model; may not be a catalog name
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,

    pub status: ToolCallStatus,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            status: ToolCallStatus::Pending,
        }
    }
}

/// The outcome of a tool call, consumed by the model as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result answers
    pub call_id: String,

    pub response: serde_json::Value,

    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            response,
            is_error: false,
        }
    }

    /// Wrap a failure as `{"error": message}`.
    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            response: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// An external tool implementation.
///
/// Implementations may fail freely; the executor converts every error into
/// result data before the model sees it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The catalog entry this implementation serves.
    fn name(&self) -> ToolName;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<serde_json::Value, ToolError>;
}

/// Maps catalog names to implementations.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    /// Registered names in catalog order.
    pub fn names(&self) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = self.tools.keys().copied().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSearch;

    #[async_trait]
    impl Tool for EchoSearch {
        fn name(&self) -> ToolName {
            ToolName::WebSearch
        }

        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({ "query": arguments["query"] }))
        }
    }

    #[test]
    fn catalog_has_ten_unique_names() {
        let mut names: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn parse_catalog_names() {
        assert_eq!("run_tests".parse::<ToolName>().unwrap(), ToolName::RunTests);
        assert!(matches!("delete_repo".parse::<ToolName>(), Err(ToolError::NotFound(_))));
    }

    #[test]
    fn only_command_and_tests_are_dependent() {
        let dependent: Vec<ToolName> = ToolName::ALL.into_iter().filter(|t| t.is_dependent()).collect();
        assert_eq!(dependent, vec![ToolName::ExecuteCommand, ToolName::RunTests]);
    }

    #[test]
    fn error_result_shape() {
        let result = ToolResult::error("c1", "boom");
        assert!(result.is_error);
        assert_eq!(result.response["error"], "boom");
    }

    #[tokio::test]
    async fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoSearch));
        let tool = registry.get(ToolName::WebSearch).unwrap();
        let out = tool.execute(serde_json::json!({"query": "rust"})).await.unwrap();
        assert_eq!(out["query"], "rust");
        assert!(registry.get(ToolName::ReadFile).is_none());
    }
}
