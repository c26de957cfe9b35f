//! Per-run tool state.
//!
//! The ledger is owned by the orchestrator and passed to the executor by
//! `&mut` for each call. It survives continuation passes so that a second
//! snapshot still knows the plan and the files written before the first.

use serde::Serialize;

use crate::plan::TodoItem;

/// The most recent `write_file` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastWrittenFile {
    pub path: String,
    pub content: String,
    /// False while a chunked write is still in progress.
    pub finalized: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunLedger {
    plan_title: Option<String>,
    todos: Vec<TodoItem>,
    written_paths: Vec<String>,
    last_written: Option<LastWrittenFile>,
    task_completed: bool,
    summary: Option<String>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the to-do list wholesale.
    pub fn replace_plan(&mut self, title: impl Into<String>, todos: Vec<TodoItem>) {
        self.plan_title = Some(title.into());
        self.todos = todos;
    }

    /// Record a produced file. Paths keep first-write order.
    pub fn record_write(&mut self, path: impl Into<String>, content: impl Into<String>, finalized: bool) {
        let path = path.into();
        if !self.written_paths.contains(&path) {
            self.written_paths.push(path.clone());
        }
        self.last_written = Some(LastWrittenFile {
            path,
            content: content.into(),
            finalized,
        });
    }

    /// Only `task_complete` calls this.
    pub(crate) fn complete(&mut self, summary: impl Into<String>) {
        self.task_completed = true;
        self.summary = Some(summary.into());
    }

    pub fn plan_title(&self) -> Option<&str> {
        self.plan_title.as_deref()
    }

    pub fn todos(&self) -> &[TodoItem] {
        &self.todos
    }

    pub fn written_paths(&self) -> &[String] {
        &self.written_paths
    }

    pub fn last_written(&self) -> Option<&LastWrittenFile> {
        self.last_written.as_ref()
    }

    pub fn task_completed(&self) -> bool {
        self.task_completed
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }
}
