//! Shell tools — `execute_command` and `run_tests`.
//!
//! Both run in the project root with a deadline; the child is killed if the
//! deadline passes or the call is dropped by cancellation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolName};
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::workspace::ProjectRoot;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
pub const TEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Captured output beyond this many chars keeps only its tail.
const MAX_OUTPUT_CHARS: usize = 20_000;

async fn run_shell(command: &str, cwd: &Path, timeout: Duration, tool: ToolName) -> Result<Value, ToolError> {
    debug!(tool = %tool, command = %command, "Executing shell command");

    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| ToolError::ExecutionFailed {
        tool_name: tool.to_string(),
        reason: e.to_string(),
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ToolError::ExecutionFailed {
                tool_name: tool.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            warn!(tool = %tool, command = %command, "Command timed out");
            return Err(ToolError::Timeout {
                tool_name: tool.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    if !output.status.success() {
        warn!(tool = %tool, command = %command, exit_code, "Command failed");
    }

    Ok(json!({
        "command": command,
        "exit_code": exit_code,
        "success": output.status.success(),
        "stdout": tail(&String::from_utf8_lossy(&output.stdout)),
        "stderr": tail(&String::from_utf8_lossy(&output.stderr)),
    }))
}

fn tail(text: &str) -> String {
    let count = text.chars().count();
    if count <= MAX_OUTPUT_CHARS {
        return text.trim_end().to_string();
    }
    let kept: String = text.chars().skip(count - MAX_OUTPUT_CHARS).collect();
    format!("[... {} chars truncated]\n{}", count - MAX_OUTPUT_CHARS, kept.trim_end())
}

pub struct ExecuteCommandTool {
    root: ProjectRoot,
    timeout: Duration,
}

impl ExecuteCommandTool {
    pub fn new(root: ProjectRoot) -> Self {
        Self {
            root,
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> ToolName {
        ToolName::ExecuteCommand
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let command = arguments["command"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if arguments["needs_elevation"].as_bool().unwrap_or(false) {
            return Err(ToolError::PermissionDenied {
                tool_name: "execute_command".into(),
                reason: "commands that need elevation must be run by the user".into(),
            });
        }

        run_shell(command, self.root.path(), self.timeout, ToolName::ExecuteCommand).await
    }
}

pub struct RunTestsTool {
    root: ProjectRoot,
    timeout: Duration,
}

impl RunTestsTool {
    pub fn new(root: ProjectRoot) -> Self {
        Self {
            root,
            timeout: TEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Test command for a framework name.
fn command_for(framework: &str) -> Option<&'static str> {
    Some(match framework.to_ascii_lowercase().as_str() {
        "cargo" | "rust" => "cargo test",
        "npm" | "node" | "jest" | "vitest" => "npm test",
        "pytest" | "python" => "pytest",
        "go" => "go test ./...",
        "maven" | "mvn" => "mvn -q test",
        "gradle" => "gradle test",
        _ => return None,
    })
}

/// Detect the test framework from manifests in the project root.
pub fn detect_framework(root: &Path) -> Option<&'static str> {
    const MANIFESTS: &[(&str, &str)] = &[
        ("Cargo.toml", "cargo"),
        ("package.json", "npm"),
        ("pyproject.toml", "pytest"),
        ("pytest.ini", "pytest"),
        ("setup.py", "pytest"),
        ("go.mod", "go"),
        ("pom.xml", "maven"),
        ("build.gradle", "gradle"),
        ("build.gradle.kts", "gradle"),
    ];
    MANIFESTS
        .iter()
        .find(|(manifest, _)| root.join(manifest).is_file())
        .map(|(_, framework)| *framework)
}

#[async_trait]
impl Tool for RunTestsTool {
    fn name(&self) -> ToolName {
        ToolName::RunTests
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let framework = match arguments["framework"].as_str().filter(|f| !f.is_empty()) {
            Some(f) => f.to_string(),
            None => detect_framework(self.root.path())
                .ok_or_else(|| ToolError::ExecutionFailed {
                    tool_name: "run_tests".into(),
                    reason: "no test framework detected in the project root".into(),
                })?
                .to_string(),
        };
        let command = command_for(&framework)
            .ok_or_else(|| ToolError::InvalidArguments(format!("unsupported test framework '{framework}'")))?;

        let mut result = run_shell(command, self.root.path(), self.timeout, ToolName::RunTests).await?;
        result["framework"] = json!(framework);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> (tempfile::TempDir, ProjectRoot) {
        let dir = tempfile::tempdir().unwrap();
        let root = ProjectRoot::new(dir.path());
        (dir, root)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_echo_in_project_root() {
        let (dir, root) = root();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let result = ExecuteCommandTool::new(root)
            .execute(json!({"command": "echo hello && ls"}))
            .await
            .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["exit_code"], 0);
        assert!(result["stdout"].as_str().unwrap().contains("hello"));
        assert!(result["stdout"].as_str().unwrap().contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_data_not_error() {
        let (_dir, root) = root();
        let result = ExecuteCommandTool::new(root)
            .execute(json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["exit_code"], 3);
        assert_eq!(result["stderr"], "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_timeout() {
        let (_dir, root) = root();
        let result = ExecuteCommandTool::new(root)
            .with_timeout(Duration::from_millis(100))
            .execute(json!({"command": "sleep 5"}))
            .await;
        assert!(matches!(result, Err(ToolError::Timeout { .. })));
    }

    #[tokio::test]
    async fn elevation_refused() {
        let (_dir, root) = root();
        let result = ExecuteCommandTool::new(root)
            .execute(json!({"command": "apt install x", "needs_elevation": true}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[test]
    fn framework_detection() {
        let (dir, _root) = root();
        assert_eq!(detect_framework(dir.path()), None);
        std::fs::write(dir.path().join("go.mod"), "module x").unwrap();
        assert_eq!(detect_framework(dir.path()), Some("go"));
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        assert_eq!(detect_framework(dir.path()), Some("cargo"));
        assert_eq!(command_for("Jest"), Some("npm test"));
        assert_eq!(command_for("ant"), None);
    }

    #[tokio::test]
    async fn run_tests_without_manifest_fails() {
        let (_dir, root) = root();
        let result = RunTestsTool::new(root).execute(json!({})).await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
        let (_dir, root) = self::root();
        let result = RunTestsTool::new(root).execute(json!({"framework": "ant"})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn tail_keeps_end() {
        let long = "x".repeat(MAX_OUTPUT_CHARS + 5) + "END";
        let kept = tail(&long);
        assert!(kept.starts_with("[... 8 chars truncated]"));
        assert!(kept.ends_with("END"));
    }
}
