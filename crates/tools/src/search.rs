//! Directory listing and code search: `list_files` and `search_code`.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolName};
use regex_lite::Regex;
use serde_json::{Value, json};
use tracing::debug;

use crate::workspace::{ProjectRoot, is_ignored, walk_files};

pub const MAX_MATCHES: usize = 200;
const MAX_LINE_CHARS: usize = 300;
const MAX_SEARCH_FILE_BYTES: u64 = 1024 * 1024;

pub struct ListFilesTool {
    root: ProjectRoot,
}

impl ListFilesTool {
    pub fn new(root: ProjectRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> ToolName {
        ToolName::ListFiles
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let directory = arguments["directory_path"].as_str().unwrap_or(".");
        let resolved = self.root.resolve(directory, ToolName::ListFiles)?;
        let failed = |e: std::io::Error| ToolError::ExecutionFailed {
            tool_name: "list_files".into(),
            reason: format!("cannot list '{directory}': {e}"),
        };

        let mut reader = tokio::fs::read_dir(&resolved).await.map_err(failed)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(failed)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_ignored(&name) {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push((name, is_dir));
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, is_dir)| json!({ "name": name, "type": if is_dir { "directory" } else { "file" } }))
            .collect();

        Ok(json!({
            "directory": self.root.relative(&resolved),
            "entries": entries,
        }))
    }
}

pub struct SearchCodeTool {
    root: ProjectRoot,
}

impl SearchCodeTool {
    pub fn new(root: ProjectRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for SearchCodeTool {
    fn name(&self) -> ToolName {
        ToolName::SearchCode
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let pattern = arguments["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?;
        let regex = Regex::new(pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid pattern '{pattern}': {e}")))?;

        let root = self.root.clone();
        let (matches, truncated) = tokio::task::spawn_blocking(move || search(&root, &regex))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search_code".into(),
                reason: e.to_string(),
            })?;

        debug!(pattern = %pattern, matches = matches.len(), truncated, "Code search finished");

        Ok(json!({
            "pattern": pattern,
            "matches": matches,
            "truncated": truncated,
        }))
    }
}

fn search(root: &ProjectRoot, regex: &Regex) -> (Vec<Value>, bool) {
    let mut matches = Vec::new();
    for path in walk_files(root.path()) {
        let too_big = std::fs::metadata(&path)
            .map(|m| m.len() > MAX_SEARCH_FILE_BYTES)
            .unwrap_or(true);
        if too_big {
            continue;
        }
        // Binary and non-UTF-8 files are skipped.
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            if matches.len() == MAX_MATCHES {
                return (matches, true);
            }
            matches.push(json!({
                "file": root.relative(&path),
                "line": idx + 1,
                "text": line.trim().chars().take(MAX_LINE_CHARS).collect::<String>(),
            }));
        }
    }
    (matches, false)
}
