//! Provider failure classification.
//!
//! Every vendor reports failures differently; the loop only cares which
//! recovery applies. Classification is a pure function of status, body and
//! retry hint so it can be tested without a server.

use codeloop_core::ProviderError;

/// Phrases that mark a context-window or quota overflow.
///
/// Matched case-insensitively after `_` and `-` are normalised to spaces, so
/// `context_length_exceeded` and `RESOURCE_EXHAUSTED` both hit.
pub const CONTEXT_LIMIT_PHRASES: &[&str] = &["context length", "resource exhausted", "quota exceeded"];

/// How much of an error body is kept in the error message.
const MAX_BODY_CHARS: usize = 500;

/// Check if an error message indicates a context limit.
pub fn is_context_limit(message: &str) -> bool {
    let normalized: String = message
        .chars()
        .map(|c| match c {
            '_' | '-' => ' ',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    CONTEXT_LIMIT_PHRASES.iter().any(|p| normalized.contains(p))
}

/// Classify a non-2xx response.
///
/// Order matters: the phrase table wins over the status code, so a 429
/// whose body says "quota exceeded" is a context limit, not a rate limit.
pub fn classify_http_error(status: u16, body: &str, retry_after_secs: Option<u64>) -> ProviderError {
    let message = summarize_body(body);

    if is_context_limit(body) {
        return ProviderError::ContextLimit(message);
    }

    match status {
        429 => ProviderError::RateLimited { retry_after_secs },
        408 | 504 => ProviderError::Timeout(message),
        400 | 404 | 413 | 422 => ProviderError::BadRequest(message),
        _ => ProviderError::Http {
            status_code: status,
            message,
        },
    }
}

/// Classify a failure of the HTTP client itself.
pub fn classify_transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Classify an error the vendor reported inside an already-open stream.
pub fn classify_stream_error(message: &str) -> ProviderError {
    if is_context_limit(message) {
        ProviderError::ContextLimit(message.to_string())
    } else {
        ProviderError::StreamInterrupted(message.to_string())
    }
}

/// Pull the human-readable message out of a vendor error body.
///
/// Most vendors send `{"error": {"message": ...}}`; Ollama sends
/// `{"error": "..."}`. Anything else is passed through, truncated.
fn summarize_body(body: &str) -> String {
    let extracted = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match extracted.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}…", &extracted[..cut]),
        None => extracted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_phrases_match_normalised() {
        assert!(is_context_limit("This model's maximum context length is 128000 tokens"));
        assert!(is_context_limit("error code: context_length_exceeded"));
        assert!(is_context_limit("RESOURCE_EXHAUSTED"));
        assert!(is_context_limit("Quota-Exceeded for project"));
        assert!(!is_context_limit("prompt is too long"));
        assert!(!is_context_limit("invalid api key"));
    }

    #[test]
    fn phrase_wins_over_status() {
        let err = classify_http_error(429, r#"{"error":{"message":"quota exceeded"}}"#, Some(5));
        assert!(matches!(err, ProviderError::ContextLimit(m) if m == "quota exceeded"));

        let err = classify_http_error(400, "maximum context length exceeded", None);
        assert!(matches!(err, ProviderError::ContextLimit(_)));
    }

    #[test]
    fn rate_limit_carries_retry_hint() {
        let err = classify_http_error(429, "slow down", Some(12));
        assert_eq!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: Some(12)
            }
        );
    }

    #[test]
    fn timeouts_and_bad_requests() {
        assert!(matches!(classify_http_error(408, "", None), ProviderError::Timeout(_)));
        assert!(matches!(classify_http_error(504, "gateway timeout", None), ProviderError::Timeout(_)));
        for status in [400, 404, 413, 422] {
            assert!(matches!(
                classify_http_error(status, "nope", None),
                ProviderError::BadRequest(_)
            ));
        }
    }

    #[test]
    fn everything_else_is_numbered_http_error() {
        let err = classify_http_error(503, r#"{"error":{"message":"overloaded"}}"#, None);
        assert_eq!(
            err,
            ProviderError::Http {
                status_code: 503,
                message: "overloaded".into()
            }
        );
        assert!(err.is_transient());

        let auth = classify_http_error(401, r#"{"error":"bad key"}"#, None);
        assert!(matches!(auth, ProviderError::Http { status_code: 401, ref message } if message == "bad key"));
        assert!(!auth.is_transient());
    }

    #[test]
    fn stream_errors() {
        assert!(matches!(
            classify_stream_error("Resource has been exhausted (e.g. check quota)."),
            ProviderError::StreamInterrupted(_)
        ));
        assert!(matches!(
            classify_stream_error("resource exhausted"),
            ProviderError::ContextLimit(_)
        ));
        assert!(matches!(classify_stream_error("Overloaded"), ProviderError::StreamInterrupted(_)));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let ProviderError::Http { message, .. } = classify_http_error(500, &body, None) else {
            panic!("expected http error");
        };
        assert_eq!(message.chars().count(), MAX_BODY_CHARS + 1);
    }
}
