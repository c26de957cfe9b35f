//! Stream decoders: raw response bytes → unified [`ProtocolEvent`]s.
//!
//! Every vendor wire format belongs to one of three families:
//! - delta-indexed SSE (OpenAI chat completions and its clones)
//! - named content-block SSE (Anthropic Messages)
//! - raw concatenated JSON objects (Gemini, Ollama)
//!
//! Decoders never assume a chunk boundary lines up with a protocol unit.
//! Incomplete trailing input is buffered until the next chunk, and fragments
//! that turn out to be unparseable are dropped with a `trace!` line.

pub mod content_block;
pub mod delta_indexed;
pub mod json_stream;

pub use content_block::ContentBlockDecoder;
pub use delta_indexed::DeltaIndexedDecoder;
pub use json_stream::{GeminiDecoder, JsonObjectScanner, OllamaDecoder};

use codeloop_core::ProtocolEvent;
use std::sync::atomic::{AtomicU64, Ordering};

/// Incremental decoder for one response stream.
///
/// A decoder instance serves exactly one stream; adapters build a fresh one
/// per request.
pub trait StreamDecoder: Send {
    /// Feed the next network chunk. Returns every event it completes.
    fn feed(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent>;

    /// The byte stream ended. Flush buffered input and close any open tool
    /// calls. Emits `Finish` if the stream never signalled it.
    fn finish(&mut self) -> Vec<ProtocolEvent>;
}

/// A complete logical SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// `event: <name>`
    Event(String),
    /// `data: <payload>`
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// Splits a byte stream into SSE lines.
///
/// Works on bytes and only decodes a line once its terminating `\n` has
/// arrived, so a multi-byte character split across two chunks is never
/// mangled.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buf[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            if let Some(line) = parse_line(&self.buf[consumed..end]) {
                lines.push(line);
            }
            consumed = end + 1;
        }
        self.buf.drain(..consumed);
        lines
    }

    /// Decode whatever is left once the stream has ended.
    pub fn flush(&mut self) -> Option<SseLine> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn parse_line(raw: &[u8]) -> Option<SseLine> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() || raw[0] == b':' {
        return None;
    }

    let line = String::from_utf8_lossy(raw);
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data.trim() == "[DONE]" {
            return Some(SseLine::Done);
        }
        return Some(SseLine::Data(data.to_string()));
    }
    if let Some(event) = line.strip_prefix("event:") {
        return Some(SseLine::Event(event.trim().to_string()));
    }

    // id:, retry: and unknown fields carry nothing we need
    None
}

/// Parse accumulated tool-call arguments.
///
/// Empty input means "no arguments" and becomes `{}`. Input that is not
/// valid JSON is passed through as a string so the executor can report it
/// to the model as invalid arguments.
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Arguments of a past tool call, in the object form vendors require when
/// the call is replayed in history. Unparseable text is kept under `_raw`.
pub fn object_arguments(arguments: &serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::Object(_) => arguments.clone(),
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        serde_json::Value::String(raw) => serde_json::json!({ "_raw": raw }),
        other => serde_json::json!({ "_raw": other.to_string() }),
    }
}

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique id for vendors that do not name their tool calls.
pub fn synthesize_call_id() -> String {
    format!("call_{}", NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed))
}
