//! Unified protocol events produced by every stream decoder.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::provider::Usage;

/// One decoded unit of a vendor response stream.
///
/// Decoders guarantee ordering: `ToolCallStart` precedes any `ToolCallDelta`
/// for the same id, `ToolCallEnd` closes it, and `Finish` is emitted at most
/// once, last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Assistant text to forward to the caller immediately.
    TextDelta { text: String },

    ToolCallStart { id: String, name: String },

    /// A raw argument fragment. Informational; the parsed arguments arrive
    /// with `ToolCallEnd`.
    ToolCallDelta { id: String, fragment: String },

    /// A complete tool call, ready to be queued for execution.
    ToolCallEnd {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    Finish {
        reason: Option<String>,
        usage: Option<Usage>,
    },

    /// An error reported in-band by the vendor after the stream started.
    StreamError { message: String },
}

impl ProtocolEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

/// The receiving half handed back by [`crate::Provider::stream`].
pub type EventReceiver = mpsc::Receiver<std::result::Result<ProtocolEvent, ProviderError>>;
