//! Tool executor — the boundary between the loop and tool implementations.
//!
//! `execute` never fails: unknown names, bad arguments, missing
//! implementations and implementation errors all come back as
//! `{"error": message}` results, because the model consumes results as data.

use std::sync::Arc;
use std::time::Duration;

use codeloop_core::error::ToolError;
use codeloop_core::event::RunEvent;
use codeloop_core::tool::{ToolCall, ToolName, ToolRegistry, ToolResult};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::approval::{ApprovalState, ApprovalWait, DiffSink, NoApprovals, wait_for_approvals};
use crate::catalog;
use crate::diff::{DiffStatus, PendingDiff, WriteMode};
use crate::ledger::RunLedger;
use crate::plan::parse_plan;
use crate::workspace::ProjectRoot;

pub const DEFAULT_APPROVAL_WAIT: Duration = Duration::from_secs(300);

/// Per-run handles the executor needs besides the ledger.
#[derive(Clone)]
pub struct ExecutionContext {
    pub cancel: CancellationToken,
    pub events: mpsc::Sender<RunEvent>,
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    approvals: Arc<dyn ApprovalState>,
    diff_sink: Option<Arc<dyn DiffSink>>,
    approval_wait: Duration,
    project: Option<ProjectRoot>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            approvals: Arc::new(NoApprovals),
            diff_sink: None,
            approval_wait: DEFAULT_APPROVAL_WAIT,
            project: None,
        }
    }

    /// Gate dependent tools on this approval set.
    pub fn with_approvals(mut self, approvals: Arc<dyn ApprovalState>) -> Self {
        self.approvals = approvals;
        self
    }

    /// Hand every pending diff to this collaborator as it is produced.
    pub fn with_diff_sink(mut self, sink: Arc<dyn DiffSink>) -> Self {
        self.diff_sink = Some(sink);
        self
    }

    pub fn with_approval_wait(mut self, ceiling: Duration) -> Self {
        self.approval_wait = ceiling;
        self
    }

    /// Root used to read the original content of files being written.
    pub fn with_project_root(mut self, root: ProjectRoot) -> Self {
        self.project = Some(root);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one call. Always returns a result for `call.id`.
    pub async fn execute(&self, call: &ToolCall, ledger: &mut RunLedger, ctx: &ExecutionContext) -> ToolResult {
        debug!(tool = %call.name, call_id = %call.id, "Executing tool");

        match self.dispatch(call, ledger, ctx).await {
            Ok(response) => ToolResult::ok(&call.id, response),
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                ToolResult::error(&call.id, e.to_string())
            }
        }
    }

    async fn dispatch(&self, call: &ToolCall, ledger: &mut RunLedger, ctx: &ExecutionContext) -> Result<Value, ToolError> {
        let name: ToolName = call.name.parse()?;

        let arguments = match &call.arguments {
            Value::Object(_) => call.arguments.clone(),
            Value::Null => json!({}),
            // Decoders hand back the raw text when the model's JSON does not parse
            Value::String(raw) => {
                return Err(ToolError::InvalidArguments(format!("arguments are not valid JSON: {raw}")));
            }
            other => {
                return Err(ToolError::InvalidArguments(format!("arguments must be an object, got {other}")));
            }
        };

        let missing: Vec<String> = catalog::required_arguments(name)
            .into_iter()
            .filter(|arg| arguments.get(arg).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "{name} is missing required argument(s): {}",
                missing.join(", ")
            )));
        }

        match name {
            ToolName::WriteFile => self.write_file(&arguments, ledger).await,
            ToolName::CreatePlan => {
                let (title, todos) = parse_plan(&arguments)?;
                info!(title = %title, steps = todos.len(), "Plan created");
                let steps = serde_json::to_value(&todos).unwrap_or(Value::Null);
                ledger.replace_plan(title.clone(), todos);
                Ok(json!({ "status": "created", "title": title, "steps": steps }))
            }
            ToolName::TaskComplete => {
                let summary = arguments["summary"].as_str().unwrap_or_default().to_string();
                info!(summary_len = summary.len(), "Task marked complete");
                ledger.complete(summary.clone());
                Ok(json!({ "status": "completed", "summary": summary }))
            }
            _ => {
                if name.is_dependent() {
                    self.await_approvals(name, ctx).await?;
                }
                let tool = self
                    .registry
                    .get(name)
                    .ok_or_else(|| ToolError::NotAvailable(name.to_string()))?;

                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => Err(ToolError::ExecutionFailed {
                        tool_name: name.to_string(),
                        reason: "cancelled".into(),
                    }),
                    result = tool.execute(arguments) => result,
                }
            }
        }
    }

    /// Hold a dependent tool until pending approvals clear. Proceeds after a
    /// second notice when the ceiling elapses.
    async fn await_approvals(&self, name: ToolName, ctx: &ExecutionContext) -> Result<(), ToolError> {
        if !self.approvals.has_pending() {
            return Ok(());
        }

        info!(tool = %name, ceiling_secs = self.approval_wait.as_secs(), "Waiting for pending file approvals");
        let _ = ctx
            .events
            .send(RunEvent::text(format!(
                "\n[Waiting for pending file changes to be approved before running {name}...]\n"
            )))
            .await;

        match wait_for_approvals(self.approvals.as_ref(), self.approval_wait, &ctx.cancel).await {
            ApprovalWait::Clear => Ok(()),
            ApprovalWait::TimedOut => {
                warn!(tool = %name, "Approval wait ceiling elapsed, proceeding");
                let _ = ctx
                    .events
                    .send(RunEvent::text(format!(
                        "\n[Approvals still pending after {}s; running {name} anyway.]\n",
                        self.approval_wait.as_secs()
                    )))
                    .await;
                Ok(())
            }
            ApprovalWait::Cancelled => Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: "cancelled while waiting for file approvals".into(),
            }),
        }
    }

    /// Build a pending diff. Nothing is written to disk.
    async fn write_file(&self, arguments: &Value, ledger: &mut RunLedger) -> Result<Value, ToolError> {
        let path = arguments["path"]
            .as_str()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let mode = match arguments["mode"].as_str() {
            None => WriteMode::Overwrite,
            Some(m) => WriteMode::parse(m).ok_or_else(|| ToolError::InvalidArguments(format!("unknown write mode '{m}'")))?,
        };
        let finalize = arguments["finalize"].as_bool().unwrap_or(true);

        let original = match &self.project {
            Some(root) => {
                let resolved = root.resolve(path, ToolName::WriteFile)?;
                match tokio::fs::read(&resolved).await {
                    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                    Err(e) => {
                        return Err(ToolError::ExecutionFailed {
                            tool_name: "write_file".into(),
                            reason: format!("cannot read current content of {path}: {e}"),
                        });
                    }
                }
            }
            None => None,
        };
        let is_new_file = original.is_none();
        let original = original.unwrap_or_default();

        let modified = match mode {
            WriteMode::Overwrite => content.to_string(),
            WriteMode::Append => {
                // A chunked write in progress builds on its own unapproved output.
                let base = match ledger.last_written() {
                    Some(last) if last.path == path && !last.finalized => last.content.as_str(),
                    _ => original.as_str(),
                };
                format!("{base}{content}")
            }
        };

        let diff = PendingDiff {
            path: path.to_string(),
            status: DiffStatus::Pending,
            original,
            modified,
            is_new_file,
            mode,
            finalize,
        };

        ledger.record_write(&diff.path, diff.modified.clone(), finalize);
        if let Some(sink) = &self.diff_sink {
            sink.submit(&diff);
        }
        debug!(path = %diff.path, new_file = is_new_file, mode = ?mode, finalize, "Pending diff produced");

        serde_json::to_value(&diff).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "write_file".into(),
            reason: e.to_string(),
        })
    }
}
