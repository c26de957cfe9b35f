//! The unified chat request, run settings and run report.

use std::path::PathBuf;
use std::time::Duration;

use codeloop_core::message::{Conversation, Message};
use codeloop_core::tier::{ContextMode, LicenseTier};
use serde::{Deserialize, Serialize};

use crate::continuation::DEFAULT_MAX_CONTINUATIONS;
use crate::loop_state::LoopPhase;
use crate::retry::RetryPolicy;

/// A file the caller attached to the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub files: Vec<AttachedFile>,

    /// Image paths; referenced by path only.
    #[serde(default)]
    pub images: Vec<String>,

    /// Project directory handed to the context builder.
    #[serde(default)]
    pub project: Option<PathBuf>,

    /// Requested mode; the license gate may downgrade it.
    #[serde(default, rename = "contextMode", alias = "context_mode")]
    pub context_mode: Option<ContextMode>,
}

/// One chat request from the caller.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,

    pub provider: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Falls back to the provider's default model.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub context: RequestContext,

    #[serde(default)]
    pub conversation_history: Vec<Message>,

    #[serde(default)]
    pub license_tier: LicenseTier,
}

impl std::fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRequest")
            .field("prompt", &self.prompt)
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("context", &self.context)
            .field("conversation_history", &self.conversation_history.len())
            .field("license_tier", &self.license_tier)
            .finish()
    }
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            provider: provider.into(),
            api_key: None,
            model: None,
            context: RequestContext::default(),
            conversation_history: Vec::new(),
            license_tier: LicenseTier::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_tier(mut self, tier: LicenseTier) -> Self {
        self.license_tier = tier;
        self
    }

    pub fn with_project(mut self, project: impl Into<PathBuf>) -> Self {
        self.context.project = Some(project.into());
        self
    }

    pub fn with_context_mode(mut self, mode: ContextMode) -> Self {
        self.context.context_mode = Some(mode);
        self
    }
}

/// Orchestrator settings that do not vary per request.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Used when the request names no context mode.
    pub default_context_mode: ContextMode,
    pub max_continuations: u32,
    pub snapshot_file_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: Some(8192),
            default_context_mode: ContextMode::default(),
            max_continuations: DEFAULT_MAX_CONTINUATIONS,
            snapshot_file_chars: 2000,
            retry: RetryPolicy::default(),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &codeloop_config::AppConfig) -> Self {
        Self {
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            default_context_mode: config.agent.context_mode,
            max_continuations: config.agent.max_continuations,
            snapshot_file_chars: config.agent.snapshot_file_chars,
            retry: RetryPolicy::from(&config.retry),
        }
    }

    /// Approval ceiling from config, for building the tool executor.
    pub fn approval_wait(config: &codeloop_config::AppConfig) -> Duration {
        Duration::from_secs(config.agent.approval_wait_secs)
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub phase: LoopPhase,
    /// Turns taken across every pass of the run. An iteration is one logical
    /// request; retries of a failed attempt resend the same iteration and do
    /// not count again, so this can be lower than the number of requests the
    /// provider saw.
    pub iterations: u32,
    pub continuations: u32,
    /// The final pass's conversation.
    pub conversation: Conversation,
    pub summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_wire_names() {
        let request: ChatRequest = serde_json::from_value(serde_json::json!({
            "prompt": "Add a README",
            "provider": "anthropic",
            "apiKey": "sk-ant",
            "context": { "project": "/work/demo", "contextMode": "full" },
            "licenseTier": "pro"
        }))
        .unwrap();
        assert_eq!(request.api_key.as_deref(), Some("sk-ant"));
        assert_eq!(request.context.context_mode, Some(ContextMode::Full));
        assert_eq!(request.license_tier, LicenseTier::Pro);
        assert!(request.conversation_history.is_empty());
    }

    #[test]
    fn debug_redacts_key() {
        let request = ChatRequest::new("hi", "openai").with_api_key("sk-secret");
        let debug = format!("{request:?}");
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn settings_from_default_config() {
        let config = codeloop_config::AppConfig::default();
        let settings = AgentSettings::from_config(&config);
        assert_eq!(settings.max_continuations, 10);
        assert_eq!(settings.snapshot_file_chars, 2000);
        assert_eq!(AgentSettings::approval_wait(&config), Duration::from_secs(300));
    }
}
