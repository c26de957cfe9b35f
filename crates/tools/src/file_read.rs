//! File read tools: `read_file` and `peek_file`.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolName};
use serde_json::{Value, json};

use crate::workspace::ProjectRoot;

const DEFAULT_PREVIEW_LINES: usize = 50;

/// Files larger than this are refused rather than pasted into the conversation.
const MAX_READ_BYTES: u64 = 2 * 1024 * 1024;

async fn load(root: &ProjectRoot, path: &str, tool: ToolName) -> Result<String, ToolError> {
    let resolved = root.resolve(path, tool)?;
    let failed = |reason: String| ToolError::ExecutionFailed {
        tool_name: tool.to_string(),
        reason,
    };

    let metadata = tokio::fs::metadata(&resolved)
        .await
        .map_err(|e| failed(format!("cannot read '{path}': {e}")))?;
    if metadata.is_dir() {
        return Err(failed(format!("'{path}' is a directory; use list_files")));
    }
    if metadata.len() > MAX_READ_BYTES {
        return Err(failed(format!(
            "'{path}' is {} bytes; read it in line ranges instead",
            metadata.len()
        )));
    }

    let bytes = tokio::fs::read(&resolved)
        .await
        .map_err(|e| failed(format!("cannot read '{path}': {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

pub struct ReadFileTool {
    root: ProjectRoot,
}

impl ReadFileTool {
    pub fn new(root: ProjectRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> ToolName {
        ToolName::ReadFile
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = load(&self.root, path, ToolName::ReadFile).await?;
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();

        let start = arguments["start_line"].as_u64().map(|n| n.max(1) as usize);
        let end = arguments["end_line"].as_u64().map(|n| n as usize);
        if start.is_none() && end.is_none() {
            return Ok(json!({ "path": path, "content": content, "total_lines": total }));
        }

        let start = start.unwrap_or(1);
        let end = end.unwrap_or(total).min(total);
        if start > end {
            return Err(ToolError::InvalidArguments(format!(
                "empty line range {start}..={end} (file has {total} lines)"
            )));
        }

        Ok(json!({
            "path": path,
            "content": lines[start - 1..end].join("\n"),
            "start_line": start,
            "end_line": end,
            "total_lines": total,
        }))
    }
}

pub struct PeekFileTool {
    root: ProjectRoot,
}

impl PeekFileTool {
    pub fn new(root: ProjectRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for PeekFileTool {
    fn name(&self) -> ToolName {
        ToolName::PeekFile
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let preview_lines = arguments["preview_lines"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_PREVIEW_LINES);

        let content = load(&self.root, path, ToolName::PeekFile).await?;
        let total = content.lines().count();
        let preview: Vec<&str> = content.lines().take(preview_lines).collect();

        Ok(json!({
            "path": path,
            "preview": preview.join("\n"),
            "preview_lines": preview.len(),
            "total_lines": total,
            "truncated": total > preview.len(),
        }))
    }
}
