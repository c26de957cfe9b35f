//! The HTTP pipeline shared by every adapter.
//!
//! `send` issues the request and classifies failures; `pump` spawns the
//! reader task that runs the response body through the adapter's decoder.
//! Both observe the cancellation token: before sending, while waiting for
//! headers, and at every body read.

use std::time::Duration;

use codeloop_core::{EventReceiver, ProtocolEvent, ProviderError};
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::{classify_http_error, classify_stream_error, classify_transport_error};
use crate::decode::StreamDecoder;

/// Capacity of the event channel between reader task and consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Build the HTTP client for an adapter.
///
/// The timeout covers the whole exchange including the streamed body, so a
/// stalled stream surfaces as a `Timeout` classification.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Send a request, racing the cancellation token.
pub async fn send(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
    provider: &str,
) -> Result<reqwest::Response, ProviderError> {
    if cancel.is_cancelled() {
        return Err(ProviderError::Cancelled);
    }

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        result = request.send() => result.map_err(|e| classify_transport_error(&e))?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers());
    let body = tokio::select! {
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        body = response.text() => body.unwrap_or_default(),
    };
    warn!(provider = %provider, status = status.as_u16(), body = %body, "Provider returned error");
    Err(classify_http_error(status.as_u16(), &body, retry_after))
}

/// Parse a `Retry-After` header given in seconds.
///
/// The HTTP-date form is not used by any supported vendor and is ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s.ceil() as u64)
}

/// Spawn the reader task for a successful response.
pub fn pump<D>(response: reqwest::Response, decoder: D, cancel: CancellationToken, provider: String) -> EventReceiver
where
    D: StreamDecoder + 'static,
{
    let body = response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::StreamInterrupted(e.to_string())
            }
        })
    });
    pump_stream(body, decoder, cancel, provider)
}

/// Drive any byte stream through a decoder into an event channel.
pub fn pump_stream<S, B, D>(body: S, mut decoder: D, cancel: CancellationToken, provider: String) -> EventReceiver
where
    S: Stream<Item = Result<B, ProviderError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    D: StreamDecoder + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut body = std::pin::pin!(body);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(provider = %provider, "Stream cancelled");
                    return;
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    for event in decoder.feed(bytes.as_ref()) {
                        if !forward(&tx, event).await {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!(provider = %provider, error = %e, "Stream read failed");
                    let _ = tx.send(Err(e)).await;
                    return;
                }
                None => break,
            }
        }

        for event in decoder.finish() {
            if !forward(&tx, event).await {
                return;
            }
        }
    });

    rx
}

/// Forward one event. Returns false once the stream should stop.
async fn forward(tx: &mpsc::Sender<Result<ProtocolEvent, ProviderError>>, event: ProtocolEvent) -> bool {
    match event {
        ProtocolEvent::StreamError { message } => {
            let _ = tx.send(Err(classify_stream_error(&message))).await;
            false
        }
        event => tx.send(Ok(event)).await.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DeltaIndexedDecoder;
    use reqwest::header::HeaderValue;

    async fn collect(mut rx: EventReceiver) -> Vec<Result<ProtocolEvent, ProviderError>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[test]
    fn retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(7));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("1.2"));
        assert_eq!(parse_retry_after(&headers), Some(2));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[tokio::test]
    async fn pump_decodes_chunked_body() {
        let chunks: Vec<Result<Vec<u8>, ProviderError>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"con".to_vec()),
            Ok(b"tent\":\"hi\"}}]}\n\ndata: [DONE]\n\n".to_vec()),
        ];
        let rx = pump_stream(
            futures::stream::iter(chunks),
            DeltaIndexedDecoder::new(),
            CancellationToken::new(),
            "test".into(),
        );
        let events = collect(rx).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Ok(ProtocolEvent::text("hi")));
        assert!(matches!(&events[1], Ok(e) if e.is_finish()));
    }

    #[tokio::test]
    async fn pump_converts_in_band_errors() {
        let chunks: Vec<Result<Vec<u8>, ProviderError>> =
            vec![Ok(b"data: {\"error\":{\"message\":\"context_length_exceeded\"}}\n".to_vec())];
        let rx = pump_stream(
            futures::stream::iter(chunks),
            DeltaIndexedDecoder::new(),
            CancellationToken::new(),
            "test".into(),
        );
        let events = collect(rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Err(ProviderError::ContextLimit(_))));
    }

    #[tokio::test]
    async fn pump_forwards_read_errors() {
        let chunks: Vec<Result<Vec<u8>, ProviderError>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err(ProviderError::StreamInterrupted("reset by peer".into())),
        ];
        let rx = pump_stream(
            futures::stream::iter(chunks),
            DeltaIndexedDecoder::new(),
            CancellationToken::new(),
            "test".into(),
        );
        let events = collect(rx).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Err(ProviderError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn pump_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let rx = pump_stream(
            futures::stream::pending::<Result<Vec<u8>, ProviderError>>(),
            DeltaIndexedDecoder::new(),
            cancel,
            "test".into(),
        );
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn send_refuses_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = reqwest::Client::new().post("http://127.0.0.1:9/never");
        let err = send(request, &cancel, "test").await.unwrap_err();
        assert_eq!(err, ProviderError::Cancelled);
    }
}
