//! JSON schemas for the fixed tool catalog, as advertised to the model.

use codeloop_core::provider::ToolDefinition;
use codeloop_core::tool::ToolName;
use serde_json::{Value, json};

/// All ten catalog definitions, in catalog order.
pub fn definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.iter().map(|name| definition(*name)).collect()
}

/// The definition for one catalog entry.
pub fn definition(name: ToolName) -> ToolDefinition {
    let (description, parameters) = match name {
        ToolName::ReadFile => (
            "Read a file from the project. Optionally restrict to a 1-based inclusive line range.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path relative to the project root" },
                    "start_line": { "type": "integer", "description": "First line to read (1-based)" },
                    "end_line": { "type": "integer", "description": "Last line to read (inclusive)" }
                },
                "required": ["path"]
            }),
        ),
        ToolName::PeekFile => (
            "Preview the first lines of a file and report its total line count.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path relative to the project root" },
                    "preview_lines": { "type": "integer", "description": "Number of lines to preview (default 50)" }
                },
                "required": ["path"]
            }),
        ),
        ToolName::WriteFile => (
            "Propose writing a file. The change is shown to the user as a pending diff and only applied once \
             approved. Use mode 'append' with finalize=false to write large files in chunks.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path relative to the project root" },
                    "content": { "type": "string", "description": "The file content" },
                    "mode": { "type": "string", "enum": ["overwrite", "append"], "description": "Default overwrite" },
                    "finalize": { "type": "boolean", "description": "Whether this is the last chunk (default true)" }
                },
                "required": ["path", "content"]
            }),
        ),
        ToolName::ListFiles => (
            "List the entries of a project directory.",
            json!({
                "type": "object",
                "properties": {
                    "directory_path": { "type": "string", "description": "Directory relative to the project root ('.' for the root)" }
                },
                "required": ["directory_path"]
            }),
        ),
        ToolName::SearchCode => (
            "Search project files for a regular expression. Returns matching lines with file and line number.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Regular expression to search for" }
                },
                "required": ["pattern"]
            }),
        ),
        ToolName::ExecuteCommand => (
            "Run a shell command in the project root and return its output. Waits for pending file approvals first.",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The shell command to execute" },
                    "needs_elevation": { "type": "boolean", "description": "Whether the command needs administrator rights" }
                },
                "required": ["command"]
            }),
        ),
        ToolName::RunTests => (
            "Run the project's test suite. The framework is detected from the project manifests when omitted.",
            json!({
                "type": "object",
                "properties": {
                    "framework": { "type": "string", "description": "cargo, npm, pytest, go, maven or gradle" }
                }
            }),
        ),
        ToolName::CreatePlan => (
            "Create or replace the task plan. Call again with updated step statuses to record progress.",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Short plan title" },
                    "steps": {
                        "type": "array",
                        "description": "Ordered steps, as strings or {id, description, status} objects",
                        "items": {
                            "anyOf": [
                                { "type": "string" },
                                {
                                    "type": "object",
                                    "properties": {
                                        "id": { "type": "string" },
                                        "description": { "type": "string" },
                                        "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] }
                                    },
                                    "required": ["description"]
                                }
                            ]
                        }
                    }
                },
                "required": ["title", "steps"]
            }),
        ),
        ToolName::TaskComplete => (
            "Signal that the whole task is finished. Call exactly once, at the very end.",
            json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string", "description": "What was accomplished" }
                },
                "required": ["summary"]
            }),
        ),
        ToolName::WebSearch => (
            "Search the web for documentation or other information.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query" }
                },
                "required": ["query"]
            }),
        ),
    };

    ToolDefinition {
        name: name.as_str().to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// Names of the required arguments of a catalog entry.
pub fn required_arguments(name: ToolName) -> Vec<String> {
    match definition(name).parameters.get("required") {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        _ => Vec::new(),
    }
}
