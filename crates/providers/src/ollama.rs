//! Ollama native chat provider.
//!
//! Talks to `/api/chat`, which streams newline-delimited JSON objects rather
//! than SSE. Tool call arguments are objects on the wire, not strings.

use std::time::Duration;

use async_trait::async_trait;
use codeloop_core::error::ProviderError;
use codeloop_core::message::{Message, Role};
use codeloop_core::provider::ProviderRequest;
use codeloop_core::EventReceiver;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decode::{OllamaDecoder, object_arguments};
use crate::openai_compat::DEFAULT_TIMEOUT;
use crate::transport;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    base_url: String,
    /// Only sent when a reverse proxy in front of Ollama expects one
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            api_key: None,
            client: transport::http_client(DEFAULT_TIMEOUT),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = transport::http_client(timeout);
        self
    }

    fn to_api_messages(system_prompt: Option<&str>, messages: &[Message]) -> Vec<Value> {
        let system = system_prompt.map(|s| json!({ "role": "system", "content": s }));

        system
            .into_iter()
            .chain(messages.iter().map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                    Role::Tool => "tool",
                };
                let mut msg = json!({ "role": role, "content": m.content });
                if !m.tool_calls.is_empty() {
                    msg["tool_calls"] = m
                        .tool_calls
                        .iter()
                        .map(|tc| json!({ "function": { "name": tc.name, "arguments": object_arguments(&tc.arguments) } }))
                        .collect();
                }
                msg
            }))
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system_prompt.as_deref(), &request.messages),
            "stream": request.stream,
            "options": { "temperature": request.temperature },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["options"]["num_predict"] = json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| json!({ "type": "function", "function": t }))
                .collect();
        }

        body
    }
}

#[async_trait]
impl codeloop_core::Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<EventReceiver, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = "ollama", model = %request.model, url = %url, "Sending streaming request");

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = transport::send(builder, &cancel, "ollama").await?;
        Ok(transport::pump(response, OllamaDecoder::new(), cancel, "ollama".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_core::message::MessageToolCall;
    use codeloop_core::provider::ToolDefinition;

    #[test]
    fn default_base_url() {
        let provider = OllamaProvider::new(None);
        assert_eq!(provider.base_url, "http://localhost:11434");
        assert!(provider.api_key.is_none());
        let provider = OllamaProvider::new(Some("http://gpu:11434/")).with_api_key("");
        assert_eq!(provider.base_url, "http://gpu:11434");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn tool_call_arguments_stay_objects() {
        let msg = Message::assistant_with_tools(
            "",
            vec![MessageToolCall {
                id: "call_1".into(),
                name: "search_code".into(),
                arguments: json!({"pattern": "fn main"}),
            }],
        );
        let api = OllamaProvider::to_api_messages(Some("sys"), &[msg]);
        assert_eq!(api[0]["role"], "system");
        assert_eq!(api[1]["tool_calls"][0]["function"]["arguments"]["pattern"], "fn main");
    }

    #[test]
    fn malformed_arguments_replay_as_object() {
        let request = ProviderRequest::new(
            "llama3.1",
            vec![
                Message::user("List"),
                Message::assistant_with_tools(
                    "",
                    vec![MessageToolCall {
                        id: "call_2".into(),
                        name: "list_files".into(),
                        arguments: json!("{\"directory_path\""),
                    }],
                ),
            ],
        );
        let body = OllamaProvider::request_body(&request);
        let arguments = &body["messages"][1]["tool_calls"][0]["function"]["arguments"];
        assert!(arguments.is_object());
        assert_eq!(arguments["_raw"], "{\"directory_path\"");
    }

    #[test]
    fn request_body_shape() {
        let mut request = ProviderRequest::new("llama3.1", vec![Message::user("hi")]);
        request.max_tokens = Some(64);
        request.tools = vec![ToolDefinition {
            name: "run_tests".into(),
            description: "Run tests".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = OllamaProvider::request_body(&request);
        assert_eq!(body["options"]["num_predict"], 64);
        assert_eq!(body["tools"][0]["function"]["name"], "run_tests");
        assert_eq!(body["stream"], true);
    }
}
