//! Checkpoint-and-resume after context overflow or timeout.
//!
//! When a request fails with a context-limit or timeout classification, the
//! orchestrator captures a [`ContinuationSnapshot`] of the run's progress and
//! starts a fresh pass whose only message is the snapshot's seed prompt.

use codeloop_core::error::Error;
use codeloop_core::message::Conversation;
use codeloop_tools::ledger::RunLedger;
use codeloop_tools::plan::TodoItem;
use tracing::info;

pub const DEFAULT_MAX_CONTINUATIONS: u32 = 10;

/// Recent assistant text kept in the snapshot, in chars.
const SUMMARY_CHARS: usize = 600;

/// Bounds the number of resumptions within one run.
#[derive(Debug, Clone)]
pub struct ContinuationManager {
    max_continuations: u32,
    count: u32,
}

impl ContinuationManager {
    pub fn new(max_continuations: u32) -> Self {
        Self {
            max_continuations,
            count: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max_continuations
    }

    /// Claim one continuation. Fails once the bound is reached.
    pub fn try_begin(&mut self) -> Result<u32, Error> {
        if self.count >= self.max_continuations {
            return Err(Error::ContinuationLimit {
                count: self.count,
                max: self.max_continuations,
            });
        }
        self.count += 1;
        info!(count = self.count, max = self.max_continuations, "Starting continuation session");
        Ok(self.count)
    }
}

impl Default for ContinuationManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTINUATIONS)
    }
}

/// The tail of the most recently written file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFile {
    pub path: String,
    pub content: String,
    /// Whether the head of the content was cut.
    pub truncated: bool,
    pub finalized: bool,
}

/// Resumable progress of a run. Immutable once captured; consumed by
/// [`ContinuationSnapshot::into_seed_prompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationSnapshot {
    original_goal: String,
    plan_title: Option<String>,
    todo_list: Vec<TodoItem>,
    files_created: Vec<String>,
    last_partial_file: Option<PartialFile>,
    recent_summary: Option<String>,
}

impl ContinuationSnapshot {
    pub fn capture(goal: &str, ledger: &RunLedger, conversation: &Conversation, max_file_chars: usize) -> Self {
        let last_partial_file = ledger.last_written().map(|last| {
            let (content, truncated) = keep_tail(&last.content, max_file_chars);
            PartialFile {
                path: last.path.clone(),
                content,
                truncated,
                finalized: last.finalized,
            }
        });

        let recent_summary = conversation
            .last_assistant_text()
            .map(|text| keep_tail(text.trim(), SUMMARY_CHARS).0);

        Self {
            original_goal: goal.to_string(),
            plan_title: ledger.plan_title().map(String::from),
            todo_list: ledger.todos().to_vec(),
            files_created: ledger.written_paths().to_vec(),
            last_partial_file,
            recent_summary,
        }
    }

    pub fn original_goal(&self) -> &str {
        &self.original_goal
    }

    pub fn todo_list(&self) -> &[TodoItem] {
        &self.todo_list
    }

    pub fn files_created(&self) -> &[String] {
        &self.files_created
    }

    pub fn last_partial_file(&self) -> Option<&PartialFile> {
        self.last_partial_file.as_ref()
    }

    /// Build the first message of the next pass.
    pub fn into_seed_prompt(self) -> String {
        let mut prompt = String::from(
            "CONTINUATION SESSION: the previous session stopped because it ran out of context or time. \
             Resume the task exactly where it stopped.\n\n",
        );

        prompt.push_str("## Original goal\n");
        prompt.push_str(&self.original_goal);
        prompt.push_str("\n\n");

        if !self.todo_list.is_empty() {
            match &self.plan_title {
                Some(title) => prompt.push_str(&format!("## Plan: {title}\n")),
                None => prompt.push_str("## Plan\n"),
            }
            for item in &self.todo_list {
                prompt.push_str(&format!(
                    "- {} {}. {} ({})\n",
                    item.status.marker(),
                    item.id,
                    item.description,
                    item.status
                ));
            }
            prompt.push('\n');
        }

        if !self.files_created.is_empty() {
            prompt.push_str("## Files already created\n");
            for path in &self.files_created {
                prompt.push_str(&format!("- {path}\n"));
            }
            prompt.push('\n');
        }

        if let Some(file) = &self.last_partial_file {
            prompt.push_str(&format!("## Last file written: {}\n", file.path));
            if file.truncated {
                prompt.push_str("Only the end of the content is shown.\n");
            }
            if !file.finalized {
                prompt.push_str("This file was still being written. Continue it with write_file mode \"append\".\n");
            }
            prompt.push_str("```\n");
            prompt.push_str(&file.content);
            if !file.content.ends_with('\n') {
                prompt.push('\n');
            }
            prompt.push_str("```\n\n");
        }

        if let Some(summary) = &self.recent_summary {
            prompt.push_str("## Most recent progress\n");
            prompt.push_str(summary);
            prompt.push_str("\n\n");
        }

        prompt.push_str(
            "Do NOT restart the task from the beginning and do not recreate files that already exist. \
             Continue with the next unfinished step, and call task_complete when everything is done.",
        );
        prompt
    }
}

/// Keep at most `max_chars` chars from the end of `text`, on a char boundary.
fn keep_tail(text: &str, max_chars: usize) -> (String, bool) {
    let total = text.chars().count();
    if total <= max_chars {
        return (text.to_string(), false);
    }
    let start = text
        .char_indices()
        .nth(total - max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    (format!("[...truncated]\n{}", &text[start..]), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_core::message::Message;
    use codeloop_tools::plan::TodoStatus;

    fn ledger() -> RunLedger {
        let mut ledger = RunLedger::new();
        ledger.replace_plan(
            "Write docs",
            vec![
                TodoItem::new("1", "Outline", TodoStatus::Completed),
                TodoItem::new("2", "Draft a.md", TodoStatus::Pending),
                TodoItem::new("3", "Draft b.md", TodoStatus::Pending),
            ],
        );
        ledger.record_write("a.md", "alpha", true);
        ledger.record_write("b.md", "partial text", false);
        ledger
    }

    #[test]
    fn continuation_bound() {
        let mut manager = ContinuationManager::new(10);
        for expected in 1..=10 {
            assert_eq!(manager.try_begin().unwrap(), expected);
        }
        match manager.try_begin() {
            Err(Error::ContinuationLimit { count, max }) => {
                assert_eq!((count, max), (10, 10));
            }
            other => panic!("expected ContinuationLimit, got {other:?}"),
        }
        assert_eq!(manager.count(), 10);
    }

    #[test]
    fn seed_prompt_carries_progress() {
        let snapshot = ContinuationSnapshot::capture("Write the docs", &ledger(), &Conversation::new(), 2000);
        let prompt = snapshot.into_seed_prompt();

        assert!(prompt.contains("Write the docs"));
        assert!(prompt.contains("[x] 1. Outline (completed)"));
        assert!(prompt.contains("[ ] 2. Draft a.md (pending)"));
        assert!(prompt.contains("[ ] 3. Draft b.md (pending)"));
        assert!(prompt.contains("- a.md"));
        assert!(prompt.contains("- b.md"));
        assert!(prompt.contains("partial text"));
        assert!(prompt.contains("Do NOT restart"));
    }

    #[test]
    fn long_file_keeps_tail() {
        let mut ledger = RunLedger::new();
        let content = format!("{}THE END", "é".repeat(5000));
        ledger.record_write("long.md", content, false);
        let snapshot = ContinuationSnapshot::capture("goal", &ledger, &Conversation::new(), 100);
        let file = snapshot.last_partial_file().unwrap();
        assert!(file.truncated);
        assert!(file.content.ends_with("THE END"));
        assert!(file.content.chars().count() <= 100 + "[...truncated]\n".len());
    }

    #[test]
    fn recent_summary_from_conversation() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("go"));
        conversation.push(Message::assistant("Finished the outline, starting a.md"));
        let prompt = ContinuationSnapshot::capture("goal", &RunLedger::new(), &conversation, 100).into_seed_prompt();
        assert!(prompt.contains("Finished the outline"));
        assert!(!prompt.contains("## Plan"));
        assert!(!prompt.contains("## Files already created"));
    }
}
