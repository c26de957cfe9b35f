//! Provider router — builds the right adapter for a vendor name.
//!
//! Implements [`ProviderFactory`]: the orchestrator asks for an adapter once
//! per run, passing the caller-supplied vendor and key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use codeloop_core::error::ProviderError;
use codeloop_core::provider::{Provider, ProviderFactory};
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai_compat::{DEFAULT_TIMEOUT, OpenAiCompatProvider};

/// Every vendor the router can build, in display order.
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "anthropic", "gemini", "deepseek", "ollama", "openrouter", "groq"];

/// Per-vendor overrides.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub default_model: Option<String>,
}

/// Routes adapter creation to the correct vendor implementation.
pub struct ProviderRouter {
    settings: HashMap<String, ProviderSettings>,
    fallback_key: Option<String>,
    default_provider: String,
    default_model: Option<String>,
    timeout: Duration,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            settings: HashMap::new(),
            fallback_key: None,
            default_provider: canonical_name(&default_provider.into()).to_string(),
            default_model: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Register overrides for a vendor.
    pub fn configure(&mut self, provider: &str, settings: ProviderSettings) {
        self.settings.insert(canonical_name(provider).to_string(), settings);
    }

    /// Key used for any vendor without its own.
    pub fn with_fallback_key(mut self, key: Option<String>) -> Self {
        self.fallback_key = key;
        self
    }

    /// Model used for the default provider when its section names none.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// List all buildable provider names.
    pub fn list(&self) -> Vec<&'static str> {
        KNOWN_PROVIDERS.to_vec()
    }

    fn resolve_key(&self, provider: &str, explicit: Option<&str>) -> Option<String> {
        explicit
            .filter(|k| !k.is_empty())
            .map(String::from)
            .or_else(|| self.settings.get(provider).and_then(|s| s.api_key.clone()))
            .or_else(|| self.fallback_key.clone())
    }
}

impl ProviderFactory for ProviderRouter {
    fn create(&self, provider: &str, api_key: Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> {
        let name = canonical_name(provider);
        let settings = self.settings.get(name).cloned().unwrap_or_default();
        let key = self.resolve_key(name, api_key);

        let require_key = || {
            key.clone()
                .ok_or_else(|| ProviderError::NotConfigured(format!("no API key for provider '{name}'")))
        };

        debug!(provider = %name, custom_url = settings.api_url.is_some(), "Creating provider");

        let provider: Arc<dyn Provider> = match name {
            "anthropic" => {
                let mut p = AnthropicProvider::new(require_key()?).with_timeout(self.timeout);
                if let Some(url) = &settings.api_url {
                    p = p.with_base_url(url);
                }
                Arc::new(p)
            }
            "gemini" => {
                let mut p = GeminiProvider::new(require_key()?).with_timeout(self.timeout);
                if let Some(url) = &settings.api_url {
                    p = p.with_base_url(url);
                }
                Arc::new(p)
            }
            "ollama" => Arc::new(
                OllamaProvider::new(settings.api_url.as_deref())
                    .with_api_key(key.clone().unwrap_or_default())
                    .with_timeout(self.timeout),
            ),
            "openai" | "deepseek" | "openrouter" | "groq" => {
                let base_url = settings.api_url.clone().unwrap_or_else(|| default_base_url(name).to_string());
                Arc::new(OpenAiCompatProvider::new(name, base_url, require_key()?).with_timeout(self.timeout))
            }
            // Any other name with an explicit URL is treated as an OpenAI-compatible endpoint.
            other => match &settings.api_url {
                Some(url) => Arc::new(
                    OpenAiCompatProvider::new(other, url.clone(), key.clone().unwrap_or_default())
                        .with_timeout(self.timeout),
                ),
                None => {
                    return Err(ProviderError::NotConfigured(format!(
                        "unknown provider '{other}' (known: {})",
                        KNOWN_PROVIDERS.join(", ")
                    )));
                }
            },
        };

        Ok(provider)
    }

    fn default_model(&self, provider: &str) -> Option<String> {
        let name = canonical_name(provider);
        self.settings
            .get(name)
            .and_then(|s| s.default_model.clone())
            .or_else(|| (name == self.default_provider).then(|| self.default_model.clone()).flatten())
            .or_else(|| builtin_model(name).map(String::from))
    }
}

/// Build the router from configuration.
pub fn build_from_config(config: &codeloop_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider)
        .with_fallback_key(config.api_key.clone())
        .with_default_model(&config.default_model)
        .with_timeout(Duration::from_secs(config.agent.request_timeout_secs));

    for (name, provider_config) in &config.providers {
        router.configure(
            name,
            ProviderSettings {
                api_key: provider_config.api_key.clone(),
                api_url: provider_config.api_url.clone(),
                default_model: provider_config.default_model.clone(),
            },
        );
    }

    router
}

/// Resolve vendor aliases.
pub fn canonical_name(provider: &str) -> &str {
    match provider {
        "claude" => "anthropic",
        "google" => "gemini",
        other => other,
    }
}

/// Get the default base URL for OpenAI-compatible vendors.
fn default_base_url(provider_name: &str) -> &'static str {
    match provider_name {
        "deepseek" => "https://api.deepseek.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "groq" => "https://api.groq.com/openai/v1",
        _ => "https://api.openai.com/v1",
    }
}

fn builtin_model(provider_name: &str) -> Option<&'static str> {
    Some(match provider_name {
        "openai" => "gpt-4o",
        "anthropic" => "claude-sonnet-4-20250514",
        "gemini" => "gemini-2.0-flash",
        "deepseek" => "deepseek-chat",
        "ollama" => "llama3.1",
        "openrouter" => "anthropic/claude-sonnet-4",
        "groq" => "llama-3.3-70b-versatile",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve() {
        assert_eq!(canonical_name("claude"), "anthropic");
        assert_eq!(canonical_name("google"), "gemini");
        assert_eq!(canonical_name("openai"), "openai");
    }

    #[test]
    fn creates_every_known_provider_with_a_key() {
        let router = ProviderRouter::new("openai");
        for name in KNOWN_PROVIDERS {
            let provider = router.create(name, Some("sk-test")).unwrap();
            assert_eq!(provider.name(), *name);
        }
        assert_eq!(router.create("claude", Some("k")).unwrap().name(), "anthropic");
    }

    #[test]
    fn missing_key_is_not_configured() {
        let router = ProviderRouter::new("openai");
        assert!(matches!(router.create("openai", None), Err(ProviderError::NotConfigured(_))));
        // Ollama runs locally without credentials
        assert!(router.create("ollama", None).is_ok());
    }

    #[test]
    fn unknown_provider_needs_url() {
        let mut router = ProviderRouter::new("openai");
        assert!(matches!(router.create("vllm", None), Err(ProviderError::NotConfigured(_))));
        router.configure(
            "vllm",
            ProviderSettings {
                api_url: Some("http://localhost:8000/v1".into()),
                ..Default::default()
            },
        );
        assert_eq!(router.create("vllm", None).unwrap().name(), "vllm");
    }

    #[test]
    fn key_precedence() {
        let mut router = ProviderRouter::new("openai").with_fallback_key(Some("global".into()));
        router.configure(
            "anthropic",
            ProviderSettings {
                api_key: Some("section".into()),
                ..Default::default()
            },
        );
        assert_eq!(router.resolve_key("anthropic", Some("explicit")).as_deref(), Some("explicit"));
        assert_eq!(router.resolve_key("anthropic", None).as_deref(), Some("section"));
        assert_eq!(router.resolve_key("openai", Some("")).as_deref(), Some("global"));
    }

    #[test]
    fn default_model_resolution() {
        let mut router = ProviderRouter::new("deepseek").with_default_model("deepseek-reasoner");
        router.configure(
            "ollama",
            ProviderSettings {
                default_model: Some("qwen2.5-coder".into()),
                ..Default::default()
            },
        );
        assert_eq!(router.default_model("deepseek").as_deref(), Some("deepseek-reasoner"));
        assert_eq!(router.default_model("ollama").as_deref(), Some("qwen2.5-coder"));
        assert_eq!(router.default_model("google").as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(router.default_model("mystery"), None);
    }

    #[test]
    fn build_from_default_config() {
        let config = codeloop_config::AppConfig::default();
        let router = build_from_config(&config);
        assert_eq!(router.default_provider(), "openai");
        assert_eq!(router.default_model("openai").as_deref(), Some("gpt-4o"));
    }
}
