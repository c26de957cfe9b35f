//! Project context assembly.
//!
//! The orchestrator asks a [`ContextBuilder`] for one block of text
//! describing the project, sized by the effective context mode.

pub mod project;
pub mod token;

use std::path::Path;

use async_trait::async_trait;
use codeloop_core::tier::ContextMode;

pub use project::ProjectContextBuilder;
pub use token::{budget_for, estimate_tokens};

/// Builds the project context for a prompt.
///
/// Implementations must be deterministic for a fixed file tree and keep the
/// result within roughly [`budget_for`] tokens.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    async fn build_context(&self, project_dir: &Path, mode: ContextMode) -> String;
}

/// A builder that contributes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContext;

#[async_trait]
impl ContextBuilder for NoContext {
    async fn build_context(&self, _project_dir: &Path, _mode: ContextMode) -> String {
        String::new()
    }
}
