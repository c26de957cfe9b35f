//! Decoder for Anthropic's Messages SSE stream.
//!
//! Content arrives in explicitly delimited blocks:
//! `content_block_start` opens a `text` or `tool_use` block,
//! `content_block_delta` carries `text_delta` / `input_json_delta` fragments,
//! `content_block_stop` closes the block. Tool input is only parsed once the
//! block closes. `message_delta` carries the stop reason and output usage;
//! `message_stop` ends the message.

use codeloop_core::{ProtocolEvent, Usage};
use serde_json::Value;
use tracing::trace;

use super::{SseLine, SseLineBuffer, StreamDecoder, parse_arguments, synthesize_call_id};

/// The block currently open between start and stop.
#[derive(Debug)]
enum OpenBlock {
    Text,
    ToolUse { id: String, name: String, json: String },
    /// thinking, redacted_thinking, or anything newer
    Other,
}

#[derive(Debug, Default)]
pub struct ContentBlockDecoder {
    lines: SseLineBuffer,
    open: Option<OpenBlock>,
    stop_reason: Option<String>,
    input_tokens: u32,
    output_tokens: u32,
    finished: bool,
}

impl ContentBlockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_line(&mut self, line: SseLine, out: &mut Vec<ProtocolEvent>) {
        if self.finished {
            return;
        }
        // The `event:` line repeats the `type` field of the data payload.
        let SseLine::Data(data) = line else { return };
        match serde_json::from_str::<Value>(&data) {
            Ok(event) => self.on_event(&event, out),
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
            }
        }
    }

    fn on_event(&mut self, event: &Value, out: &mut Vec<ProtocolEvent>) {
        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(tokens) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.input_tokens = tokens as u32;
                }
            }
            "content_block_start" => {
                // A start without a stop for the previous block: close it first.
                self.close_block(out);
                let block = &event["content_block"];
                self.open = Some(match block["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(ProtocolEvent::text(text));
                        }
                        OpenBlock::Text
                    }
                    Some("tool_use") => {
                        let id = block["id"]
                            .as_str()
                            .filter(|id| !id.is_empty())
                            .map(String::from)
                            .unwrap_or_else(synthesize_call_id);
                        let name = block["name"].as_str().unwrap_or_default().to_string();
                        out.push(ProtocolEvent::ToolCallStart {
                            id: id.clone(),
                            name: name.clone(),
                        });
                        OpenBlock::ToolUse {
                            id,
                            name,
                            json: String::new(),
                        }
                    }
                    _ => OpenBlock::Other,
                });
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match (delta["type"].as_str(), self.open.as_mut()) {
                    (Some("text_delta"), _) => {
                        if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(ProtocolEvent::text(text));
                        }
                    }
                    (Some("input_json_delta"), Some(OpenBlock::ToolUse { id, json, .. })) => {
                        if let Some(partial) = delta["partial_json"].as_str() {
                            json.push_str(partial);
                            out.push(ProtocolEvent::ToolCallDelta {
                                id: id.clone(),
                                fragment: partial.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => self.close_block(out),
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(tokens) = event["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = tokens as u32;
                }
                if let Some(tokens) = event["usage"]["input_tokens"].as_u64() {
                    self.input_tokens = tokens as u32;
                }
            }
            "message_stop" => self.close(out),
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| event["error"].to_string());
                out.push(ProtocolEvent::StreamError { message });
            }
            // ping and future event types
            _ => {}
        }
    }

    fn close_block(&mut self, out: &mut Vec<ProtocolEvent>) {
        if let Some(OpenBlock::ToolUse { id, name, json }) = self.open.take() {
            out.push(ProtocolEvent::ToolCallEnd {
                id,
                name,
                arguments: parse_arguments(&json),
            });
        }
    }

    fn close(&mut self, out: &mut Vec<ProtocolEvent>) {
        if self.finished {
            return;
        }
        self.close_block(out);
        self.finished = true;
        let usage = (self.input_tokens > 0 || self.output_tokens > 0).then(|| Usage {
            prompt_tokens: self.input_tokens,
            completion_tokens: self.output_tokens,
            total_tokens: self.input_tokens + self.output_tokens,
        });
        out.push(ProtocolEvent::Finish {
            reason: self.stop_reason.take(),
            usage,
        });
    }
}

impl StreamDecoder for ContentBlockDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        let mut out = Vec::new();
        for line in self.lines.push(chunk) {
            self.on_line(line, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Vec<ProtocolEvent> {
        let mut out = Vec::new();
        if let Some(line) = self.lines.flush() {
            self.on_line(line, &mut out);
        }
        self.close(&mut out);
        out
    }
}
