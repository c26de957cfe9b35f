//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via named SSE content-block events

use std::time::Duration;

use async_trait::async_trait;
use codeloop_core::error::ProviderError;
use codeloop_core::message::{Message, Role};
use codeloop_core::provider::{ProviderRequest, ToolDefinition};
use codeloop_core::EventReceiver;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decode::{ContentBlockDecoder, object_arguments};
use crate::openai_compat::DEFAULT_TIMEOUT;
use crate::transport;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: transport::http_client(DEFAULT_TIMEOUT),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = transport::http_client(timeout);
        self
    }

    /// Collect the system prompt: the request field plus any system messages.
    /// Anthropic puts it at the top level, not in messages.
    fn extract_system<'a>(system_prompt: Option<&'a str>, messages: &'a [Message]) -> Option<String> {
        let parts: Vec<&str> = system_prompt
            .into_iter()
            .chain(
                messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str()),
            )
            .filter(|s| !s.is_empty())
            .collect();

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Convert messages to Anthropic API format with content blocks.
    ///
    /// Consecutive tool results are merged into one user message, since
    /// every result for an assistant turn must arrive together.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {} // handled separately
                Role::User => result.push(AnthropicMessage {
                    role: "user",
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                Role::Assistant if msg.tool_calls.is_empty() => result.push(AnthropicMessage {
                    role: "assistant",
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                Role::Assistant => {
                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    blocks.extend(msg.tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: object_arguments(&tc.arguments),
                    }));
                    result.push(AnthropicMessage {
                        role: "assistant",
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                    };
                    match result.last_mut() {
                        Some(AnthropicMessage {
                            role: "user",
                            content: AnthropicContent::Blocks(blocks),
                        }) => blocks.push(block),
                        _ => result.push(AnthropicMessage {
                            role: "user",
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool<'_>> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.parameters,
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
            "stream": request.stream,
        });

        if let Some(system) = Self::extract_system(request.system_prompt.as_deref(), &request.messages) {
            body["system"] = serde_json::json!(system);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

#[async_trait]
impl codeloop_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<EventReceiver, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body);

        let response = transport::send(builder, &cancel, "anthropic").await?;
        Ok(transport::pump(response, ContentBlockDecoder::new(), cancel, "anthropic".into()))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_core::message::MessageToolCall;
    use codeloop_core::Provider;

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);

        let provider = provider.with_base_url("http://localhost:8080/");
        assert_eq!(provider.base_url, "http://localhost:8080");
    }

    #[test]
    fn system_extraction() {
        let messages = vec![Message::system("Be terse"), Message::user("Hi")];
        let system = AnthropicProvider::extract_system(Some("You write code"), &messages);
        assert_eq!(system.as_deref(), Some("You write code\n\nBe terse"));
        assert_eq!(AnthropicProvider::to_api_messages(&messages).len(), 1);
        assert!(AnthropicProvider::extract_system(None, &[Message::user("x")]).is_none());
    }

    #[test]
    fn tool_use_and_merged_results() {
        let messages = vec![
            Message::user("Inspect the repo"),
            Message::assistant_with_tools(
                "Looking.",
                vec![
                    MessageToolCall {
                        id: "toolu_1".into(),
                        name: "list_files".into(),
                        arguments: serde_json::json!({"directory_path": "."}),
                    },
                    MessageToolCall {
                        id: "toolu_2".into(),
                        name: "read_file".into(),
                        arguments: serde_json::json!({"path": "Cargo.toml"}),
                    },
                ],
            ),
            Message::tool_result("toolu_1", "[]"),
            Message::tool_result("toolu_2", "[package]"),
        ];
        let api = AnthropicProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 3);

        let value = serde_json::to_value(&api).unwrap();
        assert_eq!(value[1]["content"][0]["type"], "text");
        assert_eq!(value[1]["content"][1]["type"], "tool_use");
        assert_eq!(value[1]["content"][1]["input"]["directory_path"], ".");
        assert_eq!(value[2]["role"], "user");
        assert_eq!(value[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(value[2]["content"][1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn request_body_defaults_max_tokens() {
        let request = ProviderRequest::new("claude-sonnet-4-20250514", vec![Message::user("hi")]);
        let body = AnthropicProvider::request_body(&request);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["stream"], true);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn malformed_tool_input_replays_as_object() {
        use crate::decode::StreamDecoder;
        use codeloop_core::ProtocolEvent;

        let stream = concat!(
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_9\",\"name\":\"read_file\",\"input\":{}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"path\\\": \"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        );
        let mut decoder = ContentBlockDecoder::new();
        let mut events = decoder.feed(stream.as_bytes());
        events.extend(decoder.finish());
        let call = events
            .into_iter()
            .find_map(|e| match e {
                ProtocolEvent::ToolCallEnd { id, name, arguments } => Some(MessageToolCall { id, name, arguments }),
                _ => None,
            })
            .unwrap();
        assert!(call.arguments.is_string());

        let request = ProviderRequest::new(
            "claude-sonnet-4-20250514",
            vec![
                Message::user("Read it"),
                Message::assistant_with_tools("", vec![call]),
                Message::tool_result("toolu_9", "{\"error\":\"arguments are not valid JSON\"}"),
            ],
        );
        let body = AnthropicProvider::request_body(&request);
        let input = &body["messages"][1]["content"][0]["input"];
        assert!(input.is_object(), "tool_use.input must be an object, got {input}");
        assert_eq!(input["_raw"], "{\"path\": ");
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "search_code".into(),
            description: "Search".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let value = serde_json::to_value(AnthropicProvider::to_api_tools(&tools)).unwrap();
        assert_eq!(value[0]["name"], "search_code");
        assert_eq!(value[0]["input_schema"]["type"], "object");
    }
}
