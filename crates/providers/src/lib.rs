//! LLM provider adapters for codeloop.
//!
//! All providers implement the `codeloop_core::Provider` trait. Each adapter
//! only builds its vendor's request and names its stream decoder; sending,
//! cancellation, error classification and decoding are shared.

pub mod anthropic;
pub mod classify;
pub mod decode;
pub mod gemini;
pub mod ollama;
pub mod openai_compat;
pub mod router;
pub mod transport;

pub use anthropic::AnthropicProvider;
pub use classify::{classify_http_error, classify_stream_error, classify_transport_error};
pub use decode::StreamDecoder;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
