//! Provider trait — the abstraction over vendor LLM backends.
//!
//! A Provider turns one unified request into a stream of
//! [`ProtocolEvent`]s. Vendor wire shapes never leak past this trait.
//!
//! Implementations: OpenAI-compatible (OpenAI, DeepSeek, OpenRouter, Groq),
//! Anthropic, Gemini, Ollama.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::Message;
use crate::stream::EventReceiver;

/// The unified request handed to every provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o", "claude-sonnet-4-20250514")
    pub model: String,

    /// System instructions, sent however the vendor expects them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_stream() -> bool {
    true
}

impl ProviderRequest {
    /// A streaming request with default sampling settings.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            messages,
            tools: Vec::new(),
            temperature: default_temperature(),
            max_tokens: None,
            stream: true,
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The ProviderAdapter contract.
///
/// Every vendor backend implements this trait. The orchestrator calls
/// `stream()` without knowing which vendor is behind it.
///
/// The `cancel` token must be observed before the request is sent and at
/// every read of the response body; a cancelled stream simply ends.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a stream of unified protocol events.
    ///
    /// Errors returned here happened before any byte of the body was read
    /// (connection failure, non-2xx status). Errors inside the channel
    /// happened mid-stream.
    async fn stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<EventReceiver, ProviderError>;
}

/// Creates provider adapters by vendor name.
///
/// The orchestrator resolves the caller-supplied `provider` + `api_key`
/// through this seam once per run.
pub trait ProviderFactory: Send + Sync {
    /// Build an adapter for `provider`, authenticating with `api_key` when
    /// given, else with whatever credentials the factory was configured with.
    fn create(
        &self,
        provider: &str,
        api_key: Option<&str>,
    ) -> std::result::Result<Arc<dyn Provider>, ProviderError>;

    /// The model to use when the caller names none.
    fn default_model(&self, provider: &str) -> Option<String>;
}
