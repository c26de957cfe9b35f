//! System prompt and first user message construction.

use codeloop_core::tier::ContextMode;

use crate::request::AttachedFile;

const BASE_PROMPT: &str = "You are codeloop, an autonomous coding assistant working inside the user's project. \
You act by calling tools and keep going until the task is done.

## Working rules
1. For any task with more than one step, call create_plan first. Call it again with updated step statuses as you make progress.
2. Inspect before you change: use list_files, peek_file, read_file and search_code to find what you need.
3. write_file does not touch the disk. It produces a pending diff the user accepts or rejects. \
For large files, write in chunks with mode \"append\" and finalize=false, and set finalize=true on the last chunk.
4. execute_command and run_tests wait until pending file changes are approved, so they see the files you wrote.
5. Never ask for commands that need administrator rights.
6. When the whole task is finished, call task_complete with a short summary. Do not call it earlier.";

/// Build the system prompt for a run.
pub fn build_system_prompt(project_context: Option<&str>, mode: ContextMode) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    match project_context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => {
            prompt.push_str(&format!("\n\n## Project context ({mode} mode)\n"));
            prompt.push_str(context);
        }
        None => prompt.push_str("\n\nNo project context was provided. Explore with list_files if you need it."),
    }

    prompt
}

/// The first user message: the prompt, then attached files and image references.
pub fn build_user_message(prompt: &str, files: &[AttachedFile], images: &[String]) -> String {
    let mut message = prompt.to_string();

    for file in files {
        message.push_str(&format!("\n\n### Attached file: {}\n```\n{}\n```", file.path, file.content.trim_end()));
    }

    if !images.is_empty() {
        message.push_str("\n\n### Attached images\n");
        for image in images {
            message.push_str(&format!("- {image}\n"));
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_rules_and_context() {
        let prompt = build_system_prompt(Some("# Project: demo"), ContextMode::Smart);
        assert!(prompt.contains("create_plan"));
        assert!(prompt.contains("task_complete"));
        assert!(prompt.contains("pending diff"));
        assert!(prompt.contains("## Project context (smart mode)"));
        assert!(prompt.contains("# Project: demo"));
    }

    #[test]
    fn empty_context_is_noted() {
        let prompt = build_system_prompt(Some("   "), ContextMode::Minimal);
        assert!(prompt.contains("No project context"));
    }

    #[test]
    fn attachments_are_inlined() {
        let files = vec![AttachedFile {
            path: "src/lib.rs".into(),
            content: "pub fn f() {}\n".into(),
        }];
        let message = build_user_message("Explain this", &files, &["screen.png".into()]);
        assert!(message.starts_with("Explain this"));
        assert!(message.contains("### Attached file: src/lib.rs"));
        assert!(message.contains("pub fn f() {}"));
        assert!(message.contains("- screen.png"));
        assert_eq!(build_user_message("Hi", &[], &[]), "Hi");
    }
}
