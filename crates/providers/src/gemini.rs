//! Google Gemini provider (Generative Language API).
//!
//! Streams `models/{model}:streamGenerateContent` without `alt=sse`, so the
//! body is a single JSON array delivered piecemeal and decoded by brace
//! depth. Function results are matched to calls by tool name, not id.

use std::time::Duration;

use async_trait::async_trait;
use codeloop_core::error::ProviderError;
use codeloop_core::message::{Conversation, Message, Role};
use codeloop_core::provider::{ProviderRequest, ToolDefinition};
use codeloop_core::EventReceiver;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decode::{GeminiDecoder, object_arguments};
use crate::openai_compat::DEFAULT_TIMEOUT;
use crate::transport;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: transport::http_client(DEFAULT_TIMEOUT),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = transport::http_client(timeout);
        self
    }

    /// Convert messages to `contents`.
    ///
    /// Roles are `user` and `model`; consecutive tool results are folded
    /// into one `user` turn of `functionResponse` parts.
    fn to_contents(messages: &[Message]) -> Vec<Value> {
        let history = Conversation::from_messages(messages.to_vec());
        let mut contents: Vec<Value> = Vec::new();
        let mut pending_responses: Vec<Value> = Vec::new();

        let flush = |contents: &mut Vec<Value>, pending: &mut Vec<Value>| {
            if !pending.is_empty() {
                contents.push(json!({ "role": "user", "parts": std::mem::take(pending) }));
            }
        };

        for msg in messages {
            match msg.role {
                Role::System => {}
                Role::Tool => {
                    let call_id = msg.tool_call_id.as_deref().unwrap_or_default();
                    let name = history.tool_name_for(call_id).unwrap_or(call_id);
                    pending_responses.push(json!({
                        "functionResponse": {
                            "name": name,
                            "response": Self::as_response_object(&msg.content),
                        }
                    }));
                }
                Role::User => {
                    flush(&mut contents, &mut pending_responses);
                    contents.push(json!({ "role": "user", "parts": [{ "text": msg.content }] }));
                }
                Role::Assistant => {
                    flush(&mut contents, &mut pending_responses);
                    let mut parts = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(json!({ "text": msg.content }));
                    }
                    for tc in &msg.tool_calls {
                        parts.push(json!({ "functionCall": { "name": tc.name, "args": object_arguments(&tc.arguments) } }));
                    }
                    if !parts.is_empty() {
                        contents.push(json!({ "role": "model", "parts": parts }));
                    }
                }
            }
        }
        flush(&mut contents, &mut pending_responses);
        contents
    }

    /// `functionResponse.response` must be an object.
    fn as_response_object(content: &str) -> Value {
        match serde_json::from_str::<Value>(content) {
            Ok(value @ Value::Object(_)) => value,
            Ok(other) => json!({ "result": other }),
            Err(_) => json!({ "result": content }),
        }
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Value {
        json!([{ "functionDeclarations": tools }])
    }

    fn request_body(request: &ProviderRequest) -> Value {
        let mut body = json!({
            "contents": Self::to_contents(&request.messages),
            "generationConfig": { "temperature": request.temperature },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["generationConfig"]["maxOutputTokens"] = json!(max_tokens);
        }

        let system: Vec<&str> = request
            .system_prompt
            .as_deref()
            .into_iter()
            .chain(
                request
                    .messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str()),
            )
            .collect();
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
        }

        if !request.tools.is_empty() {
            body["tools"] = Self::to_api_tools(&request.tools);
        }

        body
    }
}

#[async_trait]
impl codeloop_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<EventReceiver, ProviderError> {
        let url = format!("{}/models/{}:streamGenerateContent", self.base_url, request.model);
        let body = Self::request_body(&request);

        debug!(provider = "gemini", model = %request.model, "Sending streaming request");

        let builder = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&body);

        let response = transport::send(builder, &cancel, "gemini").await?;
        Ok(transport::pump(response, GeminiDecoder::new(), cancel, "gemini".into()))
    }
}
