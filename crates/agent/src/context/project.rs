//! Reference context builder over a project directory.
//!
//! - minimal: the file tree
//! - smart: the file tree plus manifests and READMEs
//! - full: the file tree plus every text file, in walk order
//!
//! Sections are added in a fixed order until the mode's budget is spent, so
//! the same tree always produces the same text.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use codeloop_core::tier::ContextMode;
use codeloop_tools::workspace::{ProjectRoot, walk_files};
use tracing::{debug, warn};

use super::ContextBuilder;
use super::token::{char_budget_for, estimate_tokens};

/// Files included in smart mode when present at the project root.
const KEY_FILES: &[&str] = &[
    "README.md",
    "README",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "tsconfig.json",
];

/// No single file may take more than this share of the budget.
const MAX_FILE_SHARE: usize = 4;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectContextBuilder;

impl ProjectContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous build; the async trait method runs this on the blocking pool.
    pub fn build_blocking(project_dir: &Path, mode: ContextMode) -> String {
        let root = ProjectRoot::new(project_dir);
        let budget = char_budget_for(mode);
        let files = walk_files(root.path());

        let name = root
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.path().display().to_string());

        let mut out = format!("# Project: {name}\n\n");
        append_tree(&mut out, &root, &files, budget / 2);

        let candidates: Vec<&PathBuf> = match mode {
            ContextMode::Minimal => Vec::new(),
            ContextMode::Smart => KEY_FILES
                .iter()
                .filter_map(|key| files.iter().find(|f| root.relative(f) == *key))
                .collect(),
            ContextMode::Full => files.iter().collect(),
        };

        let per_file = budget / MAX_FILE_SHARE;
        // Room for the omission note.
        let limit = budget.saturating_sub(128);
        let mut skipped = 0usize;
        for path in candidates {
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            let section = render_file(&root.relative(path), &content, per_file);
            if out.len() + section.len() > limit {
                skipped += 1;
                continue;
            }
            out.push_str(&section);
        }
        if skipped > 0 {
            out.push_str(&format!("\n({skipped} more files omitted to fit the context budget)\n"));
        }

        debug!(mode = %mode, files = files.len(), tokens = estimate_tokens(&out), "Project context built");
        out
    }
}

fn append_tree(out: &mut String, root: &ProjectRoot, files: &[PathBuf], budget: usize) {
    out.push_str("## Files\n");
    let start = out.len();
    for (i, file) in files.iter().enumerate() {
        let line = format!("- {}\n", root.relative(file));
        if out.len() - start + line.len() > budget {
            out.push_str(&format!("- ... ({} more)\n", files.len() - i));
            break;
        }
        out.push_str(&line);
    }
    out.push('\n');
}

fn render_file(relative: &str, content: &str, max_bytes: usize) -> String {
    let body = if content.len() > max_bytes {
        let mut cut = max_bytes;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n[... truncated]", &content[..cut])
    } else {
        content.trim_end().to_string()
    };
    format!("## {relative}\n```\n{body}\n```\n\n")
}

#[async_trait]
impl ContextBuilder for ProjectContextBuilder {
    async fn build_context(&self, project_dir: &Path, mode: ContextMode) -> String {
        let dir = project_dir.to_path_buf();
        match tokio::task::spawn_blocking(move || Self::build_blocking(&dir, mode)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Context build task failed");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# Demo\n").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        dir
    }

    #[test]
    fn minimal_is_tree_only() {
        let dir = project();
        let text = ProjectContextBuilder::build_blocking(dir.path(), ContextMode::Minimal);
        assert!(text.contains("- Cargo.toml"));
        assert!(text.contains("- src/main.rs"));
        assert!(!text.contains("[package]"));
    }

    #[test]
    fn smart_adds_manifests() {
        let dir = project();
        let text = ProjectContextBuilder::build_blocking(dir.path(), ContextMode::Smart);
        assert!(text.contains("[package]"));
        assert!(text.contains("# Demo"));
        assert!(!text.contains("fn main"));
    }

    #[test]
    fn full_adds_sources() {
        let dir = project();
        let text = ProjectContextBuilder::build_blocking(dir.path(), ContextMode::Full);
        assert!(text.contains("fn main"));
    }

    #[test]
    fn deterministic_and_bounded() {
        let dir = project();
        std::fs::write(dir.path().join("src/huge.rs"), "// filler\n".repeat(50_000)).unwrap();
        let a = ProjectContextBuilder::build_blocking(dir.path(), ContextMode::Full);
        let b = ProjectContextBuilder::build_blocking(dir.path(), ContextMode::Full);
        assert_eq!(a, b);
        assert!(estimate_tokens(&a) <= crate::context::token::budget_for(ContextMode::Full));
    }

    #[tokio::test]
    async fn async_builder_matches_blocking() {
        let dir = project();
        let text = ProjectContextBuilder::new()
            .build_context(dir.path(), ContextMode::Smart)
            .await;
        assert_eq!(text, ProjectContextBuilder::build_blocking(dir.path(), ContextMode::Smart));
    }
}
