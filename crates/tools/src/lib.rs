//! Tool execution for codeloop.
//!
//! The [`ToolExecutor`] is the only way the agent loop runs tools. It owns
//! dispatch over the fixed catalog, the approval gate for dependent tools,
//! and the tools that only touch run state (`write_file`, `create_plan`,
//! `task_complete`). Everything else is delegated to implementations in a
//! [`ToolRegistry`]; the ones in this crate work inside a project root.

pub mod approval;
pub mod catalog;
pub mod diff;
pub mod executor;
pub mod file_read;
pub mod ledger;
pub mod plan;
pub mod search;
pub mod shell;
pub mod workspace;

use std::sync::Arc;

use codeloop_core::tool::ToolRegistry;

pub use approval::{ApprovalState, ApprovalWait, DiffSink, NoApprovals, PendingApprovals, wait_for_approvals};
pub use diff::{PendingDiff, WriteMode};
pub use executor::{ExecutionContext, ToolExecutor};
pub use ledger::{LastWrittenFile, RunLedger};
pub use plan::{TodoItem, TodoStatus};
pub use workspace::ProjectRoot;

/// Registry with every bundled implementation, confined to `root`.
///
/// `web_search` has no bundled implementation; calls to it report that the
/// tool is not available.
pub fn default_registry(root: &ProjectRoot) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(file_read::ReadFileTool::new(root.clone())));
    registry.register(Arc::new(file_read::PeekFileTool::new(root.clone())));
    registry.register(Arc::new(search::ListFilesTool::new(root.clone())));
    registry.register(Arc::new(search::SearchCodeTool::new(root.clone())));
    registry.register(Arc::new(shell::ExecuteCommandTool::new(root.clone())));
    registry.register(Arc::new(shell::RunTestsTool::new(root.clone())));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_core::tool::ToolName;

    #[test]
    fn default_registry_covers_local_tools() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(&ProjectRoot::new(dir.path()));
        assert_eq!(
            registry.names(),
            vec![
                ToolName::ReadFile,
                ToolName::PeekFile,
                ToolName::ListFiles,
                ToolName::SearchCode,
                ToolName::ExecuteCommand,
                ToolName::RunTests,
            ]
        );
        assert!(registry.get(ToolName::WebSearch).is_none());
    }
}
