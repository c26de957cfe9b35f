//! Decoder for the OpenAI chat-completions SSE family.
//!
//! Tool calls arrive as fragments keyed by a zero-based `index`: the first
//! fragment for an index usually carries `id` and `function.name`, later
//! ones append to `function.arguments`. A call is complete only once a
//! `finish_reason` (or `[DONE]`, or the end of the stream) closes the turn.
//!
//! DeepSeek, OpenRouter and Groq speak the same grammar; DeepSeek adds
//! `reasoning_content`, which is not part of the transcript.

use std::collections::BTreeMap;

use codeloop_core::{ProtocolEvent, Usage};
use serde::Deserialize;
use tracing::trace;

use super::{SseLine, SseLineBuffer, StreamDecoder, parse_arguments, synthesize_call_id};

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
    started: bool,
}

#[derive(Debug, Default)]
pub struct DeltaIndexedDecoder {
    lines: SseLineBuffer,
    calls: BTreeMap<u32, PendingCall>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    finished: bool,
}

impl DeltaIndexedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_line(&mut self, line: SseLine, out: &mut Vec<ProtocolEvent>) {
        if self.finished {
            return;
        }
        match line {
            SseLine::Event(_) => {}
            SseLine::Done => self.close(out),
            SseLine::Data(data) => match serde_json::from_str::<StreamResponse>(&data) {
                Ok(chunk) => self.on_chunk(chunk, out),
                Err(e) => {
                    trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                }
            },
        }
    }

    fn on_chunk(&mut self, chunk: StreamResponse, out: &mut Vec<ProtocolEvent>) {
        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| error.to_string());
            out.push(ProtocolEvent::StreamError { message });
            return;
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(reasoning) = delta.reasoning_content.as_deref() {
                trace!(len = reasoning.len(), "Skipping reasoning content");
            }

            if let Some(text) = delta.content.filter(|c| !c.is_empty()) {
                out.push(ProtocolEvent::TextDelta { text });
            }

            for tc in delta.tool_calls.unwrap_or_default() {
                self.on_tool_delta(tc, out);
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
                self.complete_calls(out);
            }
        }
    }

    fn on_tool_delta(&mut self, tc: StreamToolCallDelta, out: &mut Vec<ProtocolEvent>) {
        let acc = self.calls.entry(tc.index).or_default();

        if let Some(id) = tc.id.filter(|id| !id.is_empty()) {
            acc.id = id;
        }
        let mut fragment = None;
        if let Some(func) = tc.function {
            if let Some(name) = func.name.filter(|n| !n.is_empty()) {
                acc.name = name;
            }
            fragment = func.arguments.filter(|a| !a.is_empty());
        }

        if !acc.started && !acc.id.is_empty() && !acc.name.is_empty() {
            acc.started = true;
            out.push(ProtocolEvent::ToolCallStart {
                id: acc.id.clone(),
                name: acc.name.clone(),
            });
        }

        if let Some(fragment) = fragment {
            acc.arguments.push_str(&fragment);
            if acc.started {
                out.push(ProtocolEvent::ToolCallDelta {
                    id: acc.id.clone(),
                    fragment,
                });
            }
        }
    }

    /// Close every open call in index order.
    fn complete_calls(&mut self, out: &mut Vec<ProtocolEvent>) {
        for (index, mut acc) in std::mem::take(&mut self.calls) {
            if acc.name.is_empty() {
                trace!(index, "Dropping tool call fragment without a name");
                continue;
            }
            if acc.id.is_empty() {
                acc.id = synthesize_call_id();
            }
            if !acc.started {
                out.push(ProtocolEvent::ToolCallStart {
                    id: acc.id.clone(),
                    name: acc.name.clone(),
                });
            }
            out.push(ProtocolEvent::ToolCallEnd {
                arguments: parse_arguments(&acc.arguments),
                id: acc.id,
                name: acc.name,
            });
        }
    }

    fn close(&mut self, out: &mut Vec<ProtocolEvent>) {
        if self.finished {
            return;
        }
        self.complete_calls(out);
        self.finished = true;
        out.push(ProtocolEvent::Finish {
            reason: self.finish_reason.take(),
            usage: self.usage.take(),
        });
    }
}

impl StreamDecoder for DeltaIndexedDecoder {
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

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_all(decoder: &mut DeltaIndexedDecoder, chunks: &[&str]) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.feed(chunk.as_bytes()));
        }
        events
    }

    fn tool_ends(events: &[ProtocolEvent]) -> Vec<(String, String, serde_json::Value)> {
        events
            .iter()
            .filter_map(|e| match e {
                ProtocolEvent::ToolCallEnd { id, name, arguments } => {
                    Some((id.clone(), name.clone(), arguments.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn text_deltas_and_finish() {
        let mut decoder = DeltaIndexedDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n",
            ],
        );
        assert_eq!(
            events,
            vec![
                ProtocolEvent::text("Hel"),
                ProtocolEvent::text("lo"),
                ProtocolEvent::Finish {
                    reason: Some("stop".into()),
                    usage: None
                },
            ]
        );
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn accumulates_arguments_by_index() {
        let mut decoder = DeltaIndexedDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"read_file\",\"arguments\":\"\"}}]}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"pa\"}}]}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"th\\\":\\\"a.rs\\\"}\"}}]}}]}\n",
                "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
            ],
        );

        assert_eq!(
            events[0],
            ProtocolEvent::ToolCallStart {
                id: "call_a".into(),
                name: "read_file".into()
            }
        );
        assert_eq!(
            tool_ends(&events),
            vec![("call_a".into(), "read_file".into(), json!({"path": "a.rs"}))]
        );
        // finish_reason alone does not finish the stream; usage may follow
        assert!(!events.iter().any(ProtocolEvent::is_finish));

        let tail = decoder.feed(
            b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n\ndata: [DONE]\n\n",
        );
        assert_eq!(
            tail,
            vec![ProtocolEvent::Finish {
                reason: Some("tool_calls".into()),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15
                })
            }]
        );
    }

    #[test]
    fn parallel_calls_complete_in_index_order() {
        let mut decoder = DeltaIndexedDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"id\":\"call_b\",\"function\":{\"name\":\"list_files\",\"arguments\":\"{}\"}},{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"peek_file\",\"arguments\":\"{}\"}}]}}]}\n",
                "data: [DONE]\n",
            ],
        );
        let ends = tool_ends(&events);
        assert_eq!(ends[0].0, "call_a");
        assert_eq!(ends[1].0, "call_b");
    }

    #[test]
    fn chunk_boundary_inside_sse_line() {
        let full = "data: {\"choices\":[{\"delta\":{\"content\":\"split\"}}]}\n";
        let (a, b) = full.split_at(17);
        let mut decoder = DeltaIndexedDecoder::new();
        assert!(decoder.feed(a.as_bytes()).is_empty());
        assert_eq!(decoder.feed(b.as_bytes()), vec![ProtocolEvent::text("split")]);
    }

    #[test]
    fn malformed_fragment_is_dropped() {
        let mut decoder = DeltaIndexedDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            ],
        );
        assert_eq!(events, vec![ProtocolEvent::text("ok")]);
    }

    #[test]
    fn stream_end_without_done_closes_open_calls() {
        let mut decoder = DeltaIndexedDecoder::new();
        decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"task_complete\",\"arguments\":\"{\\\"summary\\\":\\\"ok\\\"}\"}}]}}]}\n",
        );
        let events = decoder.finish();
        assert_eq!(tool_ends(&events).len(), 1);
        assert!(events.last().is_some_and(ProtocolEvent::is_finish));
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn empty_and_invalid_arguments() {
        let mut decoder = DeltaIndexedDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"list_files\"}},{\"index\":1,\"id\":\"c2\",\"function\":{\"name\":\"read_file\",\"arguments\":\"{bad\"}}]},\"finish_reason\":\"tool_calls\"}]}\n",
            ],
        );
        let ends = tool_ends(&events);
        assert_eq!(ends[0].2, json!({}));
        assert_eq!(ends[1].2, json!("{bad"));
    }

    #[test]
    fn missing_id_is_synthesized() {
        let mut decoder = DeltaIndexedDecoder::new();
        let events = feed_all(
            &mut decoder,
            &["data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"run_tests\",\"arguments\":\"{}\"}}]},\"finish_reason\":\"tool_calls\"}]}\n"],
        );
        let ends = tool_ends(&events);
        assert!(ends[0].0.starts_with("call_"));
    }

    #[test]
    fn reasoning_content_is_not_text() {
        let mut decoder = DeltaIndexedDecoder::new();
        let events = decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"thinking...\",\"content\":\"\"}}]}\n",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn in_band_error_event() {
        let mut decoder = DeltaIndexedDecoder::new();
        let events = decoder.feed(
            b"data: {\"error\":{\"message\":\"This model's maximum context length is 8192 tokens\"}}\n",
        );
        assert!(matches!(
            &events[0],
            ProtocolEvent::StreamError { message } if message.contains("context length")
        ));
    }
}
