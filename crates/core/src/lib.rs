//! # codeloop core
//!
//! Domain types, traits, and error definitions for the codeloop agent
//! orchestration loop. This crate has **zero framework dependencies**: it
//! defines the model that the provider, tool, and agent crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here and every implementation lives in its own crate:
//! - `Provider` / `ProviderFactory` — vendor adapters (codeloop-providers)
//! - `Tool` — external tool implementations (codeloop-tools)
//! - `RunEvent` — the outward event shape the UI layer consumes
//!
//! All crates depend inward on core, which keeps the dependency graph clean
//! and lets tests swap any collaborator for a scripted one.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod stream;
pub mod tier;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{RunEvent, RunEventKind};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderFactory, ProviderRequest, ToolDefinition, Usage};
pub use stream::{EventReceiver, ProtocolEvent};
pub use tier::{ContextMode, LicenseTier};
pub use tool::{Tool, ToolCall, ToolCallStatus, ToolName, ToolRegistry, ToolResult};
