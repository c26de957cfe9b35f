//! Project root confinement for the local tools.
//!
//! Every path a tool receives is resolved against the project root. Parent
//! components are rejected outright, absolute paths must already lie under
//! the root, and existing paths are canonicalized so a symlink cannot lead
//! outside it.

use std::path::{Component, Path, PathBuf};

use codeloop_core::error::ToolError;
use codeloop_core::tool::ToolName;

/// Directories never walked by listing, search or context building.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    ".next",
    "__pycache__",
    ".venv",
    "venv",
    "vendor",
];

#[derive(Debug, Clone)]
pub struct ProjectRoot {
    root: PathBuf,
}

impl ProjectRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` under the root, or refuse with `PermissionDenied`.
    pub fn resolve(&self, path: &str, tool: ToolName) -> Result<PathBuf, ToolError> {
        let denied = |reason: String| ToolError::PermissionDenied {
            tool_name: tool.to_string(),
            reason,
        };

        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(ToolError::InvalidArguments("'path' must not be empty".into()));
        }

        let candidate = Path::new(trimmed);
        if candidate.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(denied(format!("path traversal detected in '{path}'")));
        }

        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        if !joined.starts_with(&self.root) {
            return Err(denied(format!("'{path}' is outside the project root")));
        }

        // Symlinks are followed for existing paths only; new files resolve through their parent.
        if let Ok(canonical) = joined.canonicalize()
            && !canonical.starts_with(&self.root)
        {
            return Err(denied(format!("'{path}' resolves outside the project root")));
        }

        Ok(joined)
    }

    /// Display form of a path: relative to the root, `/`-separated.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let display = rel.to_string_lossy().replace('\\', "/");
        if display.is_empty() { ".".into() } else { display }
    }
}

/// Whether a directory entry name is skipped by walks.
pub fn is_ignored(name: &str) -> bool {
    IGNORED_DIRS.contains(&name) || (name.starts_with('.') && name != "." && name != "..")
}

/// Every regular file under `root`, sorted, skipping ignored directories.
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored(&entry.file_name().to_string_lossy()))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_paths_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProjectRoot::new(dir.path());
        let resolved = root.resolve("src/main.rs", ToolName::ReadFile).unwrap();
        assert!(resolved.starts_with(root.path()));
        assert_eq!(root.relative(&resolved), "src/main.rs");
        assert_eq!(root.relative(root.path()), ".");
    }

    #[test]
    fn traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProjectRoot::new(dir.path());
        let err = root.resolve("../../etc/passwd", ToolName::ReadFile).unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
        assert!(root.resolve("src/../../x", ToolName::ReadFile).is_err());
    }

    #[test]
    fn absolute_paths_outside_root_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProjectRoot::new(dir.path());
        assert!(root.resolve("/etc/passwd", ToolName::ReadFile).is_err());

        let inside = root.path().join("ok.txt");
        assert!(root.resolve(inside.to_str().unwrap(), ToolName::ReadFile).is_ok());
    }

    #[test]
    fn empty_path_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProjectRoot::new(dir.path());
        assert!(matches!(
            root.resolve("  ", ToolName::ReadFile),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn walk_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        std::fs::write(dir.path().join("target/debug/out"), "").unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "").unwrap();

        let root = ProjectRoot::new(dir.path());
        let files: Vec<String> = walk_files(root.path()).iter().map(|p| root.relative(p)).collect();
        assert_eq!(files, vec!["Cargo.toml", "src/lib.rs"]);
    }
}
