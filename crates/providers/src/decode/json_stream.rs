//! Decoders for vendors that stream bare JSON objects without SSE framing.
//!
//! Gemini's `streamGenerateContent` returns one JSON array whose elements
//! trickle in (`[{...}\n,{...}\n]`); Ollama's `/api/chat` returns one object
//! per line. Both are handled by scanning for balanced top-level `{...}`
//! spans, which makes the framing irrelevant.

use codeloop_core::{ProtocolEvent, Usage};
use serde_json::Value;
use tracing::trace;

use super::{StreamDecoder, synthesize_call_id};

/// Extracts complete top-level JSON objects from an arbitrarily chunked
/// byte stream.
///
/// Tracks brace depth byte by byte, ignoring braces inside string literals
/// (with escape handling). Bytes between objects are discarded; a partial
/// object is retained until the chunk that completes it arrives.
#[derive(Debug, Default)]
pub struct JsonObjectScanner {
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonObjectScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every object it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();

        for &b in chunk {
            if self.depth == 0 {
                if b == b'{' {
                    self.buf.clear();
                    self.buf.push(b);
                    self.depth = 1;
                }
                continue;
            }

            self.buf.push(b);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        match serde_json::from_slice::<Value>(&self.buf) {
                            Ok(value) => out.push(value),
                            Err(e) => {
                                trace!(error = %e, len = self.buf.len(), "Dropping unparseable JSON span");
                            }
                        }
                        self.buf.clear();
                    }
                }
                _ => {}
            }
        }

        out
    }

    /// Bytes of an object still waiting for its closing brace.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Decoder for Gemini `streamGenerateContent` (no `alt=sse`).
///
/// Function calls arrive whole inside a part, so start and end are emitted
/// together. Gemini does not assign call ids.
#[derive(Debug, Default)]
pub struct GeminiDecoder {
    scanner: JsonObjectScanner,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    finished: bool,
}

impl GeminiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_object(&mut self, obj: &Value, out: &mut Vec<ProtocolEvent>) {
        if let Some(error) = obj.get("error") {
            let message = error["message"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| error.to_string());
            out.push(ProtocolEvent::StreamError { message });
            return;
        }

        if let Some(candidate) = obj["candidates"].get(0) {
            for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
                if part["thought"].as_bool() == Some(true) {
                    continue;
                }
                if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
                    out.push(ProtocolEvent::text(text));
                }
                if let Some(call) = part.get("functionCall") {
                    emit_whole_call(call, "args", out);
                }
            }
            if let Some(reason) = candidate["finishReason"].as_str() {
                self.finish_reason = Some(reason.to_string());
            }
        }

        if let Some(meta) = obj.get("usageMetadata") {
            let prompt = meta["promptTokenCount"].as_u64().unwrap_or(0) as u32;
            let completion = meta["candidatesTokenCount"].as_u64().unwrap_or(0) as u32;
            let total = meta["totalTokenCount"]
                .as_u64()
                .map(|t| t as u32)
                .unwrap_or(prompt + completion);
            self.usage = Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: total,
            });
        }
    }
}

impl StreamDecoder for GeminiDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        for obj in self.scanner.push(chunk) {
            self.on_object(&obj, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Vec<ProtocolEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![ProtocolEvent::Finish {
            reason: self.finish_reason.take(),
            usage: self.usage.take(),
        }]
    }
}

/// Decoder for Ollama `/api/chat` NDJSON.
#[derive(Debug, Default)]
pub struct OllamaDecoder {
    scanner: JsonObjectScanner,
    finished: bool,
}

impl OllamaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_object(&mut self, obj: &Value, out: &mut Vec<ProtocolEvent>) {
        if let Some(error) = obj.get("error") {
            let message = error
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| error.to_string());
            out.push(ProtocolEvent::StreamError { message });
            return;
        }

        let message = &obj["message"];
        if let Some(text) = message["content"].as_str().filter(|t| !t.is_empty()) {
            out.push(ProtocolEvent::text(text));
        }
        for call in message["tool_calls"].as_array().into_iter().flatten() {
            emit_whole_call(&call["function"], "arguments", out);
        }

        if obj["done"].as_bool() == Some(true) {
            self.finished = true;
            let prompt = obj["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
            let completion = obj["eval_count"].as_u64().unwrap_or(0) as u32;
            out.push(ProtocolEvent::Finish {
                reason: obj["done_reason"].as_str().map(String::from),
                usage: Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                }),
            });
        }
    }
}

impl StreamDecoder for OllamaDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        let mut out = Vec::new();
        for obj in self.scanner.push(chunk) {
            if self.finished {
                break;
            }
            self.on_object(&obj, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Vec<ProtocolEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![ProtocolEvent::Finish {
            reason: None,
            usage: None,
        }]
    }
}

/// Emit start + end for a function call delivered in one piece.
fn emit_whole_call(call: &Value, args_field: &str, out: &mut Vec<ProtocolEvent>) {
    let Some(name) = call["name"].as_str().filter(|n| !n.is_empty()) else {
        trace!(call = %call, "Dropping function call without a name");
        return;
    };
    let id = call["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .map(String::from)
        .unwrap_or_else(synthesize_call_id);
    let arguments = match &call[args_field] {
        Value::Null => Value::Object(serde_json::Map::new()),
        // some models send the arguments JSON-encoded
        Value::String(raw) => super::parse_arguments(raw),
        other => other.clone(),
    };
    out.push(ProtocolEvent::ToolCallStart {
        id: id.clone(),
        name: name.to_string(),
    });
    out.push(ProtocolEvent::ToolCallEnd {
        id,
        name: name.to_string(),
        arguments,
    });
}
