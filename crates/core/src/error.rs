//! Error types for the codeloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all codeloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Continuation ---
    #[error("Too many continuations: {count} of {max} already used")]
    ContinuationLimit { count: u32, max: u32 },

    // --- Run lifecycle ---
    #[error("A run is already active on this orchestrator")]
    RunInProgress,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of a single provider request, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Connection-level failure before any response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response that matched no more specific class.
    #[error("API request failed: {message} (status: {status_code})")]
    Http { status_code: u16, message: String },

    #[error("Rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// The request no longer fits the model's context window or quota.
    #[error("Context limit reached: {0}")]
    ContextLimit(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request cancelled")]
    Cancelled,
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited { .. } | Self::StreamInterrupted(_) => true,
            Self::Http { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Whether the failure should be recovered by checkpoint-and-resume.
    pub fn triggers_continuation(&self) -> bool {
        matches!(self, Self::ContextLimit(_) | Self::Timeout(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool not available: {0}")]
    NotAvailable(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
