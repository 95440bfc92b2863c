use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::pin;
use tracing::{debug, warn};

use super::{AgentError, Progress, ResponseSource, Transport};
use crate::response::RawPayload;

/// Pick the reader for the configured transport.
pub fn source_for(transport: Transport) -> Box<dyn ResponseSource> {
    match transport {
        Transport::Json => Box::new(BufferedJson),
        Transport::Chunked => Box::new(ChunkedStream),
        Transport::Sse => Box::new(SseStream),
    }
}

/// Reads the whole body in one go.
pub struct BufferedJson;

#[async_trait]
impl ResponseSource for BufferedJson {
    fn name(&self) -> &str {
        "json"
    }

    async fn read(
        &self,
        response: reqwest::Response,
        _progress: Progress<'_>,
    ) -> Result<RawPayload, AgentError> {
        let body = response.text().await.map_err(AgentError::Transport)?;
        debug!(bytes = body.len(), "read buffered response");
        Ok(RawPayload::Buffer(body))
    }
}

/// Consumes a chunked body incrementally and concatenates it.
pub struct ChunkedStream;

#[async_trait]
impl ResponseSource for ChunkedStream {
    fn name(&self) -> &str {
        "chunked"
    }

    async fn read(
        &self,
        response: reqwest::Response,
        progress: Progress<'_>,
    ) -> Result<RawPayload, AgentError> {
        let body = collect_chunks(response.bytes_stream(), progress).await;
        Ok(RawPayload::Buffer(body))
    }
}

/// Decodes a `text/event-stream` body into its `data:` payloads.
pub struct SseStream;

#[async_trait]
impl ResponseSource for SseStream {
    fn name(&self) -> &str {
        "sse"
    }

    fn accept(&self) -> &'static str {
        "text/event-stream"
    }

    async fn read(
        &self,
        response: reqwest::Response,
        progress: Progress<'_>,
    ) -> Result<RawPayload, AgentError> {
        let events = collect_events(response.bytes_stream(), progress).await;
        Ok(RawPayload::Events(events))
    }
}

/// Concatenate a byte stream, reporting progress after each chunk. A read
/// error ends the stream; whatever arrived before it is kept.
pub async fn collect_chunks<S, E>(stream: S, progress: Progress<'_>) -> String
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut stream = pin!(stream);
    let mut body = Vec::new();
    let mut chunks = 0usize;

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                chunks += 1;
                body.extend_from_slice(&chunk);
                progress(&format!("Processing issue... ({chunks} chunks received)"));
            }
            Err(err) => {
                warn!(error = %err, chunks, "response stream interrupted, keeping partial body");
                break;
            }
        }
    }

    debug!(chunks, bytes = body.len(), "chunked response complete");
    String::from_utf8_lossy(&body).into_owned()
}

/// Decode an SSE byte stream into JSON payloads, reporting progress after
/// each chunk. Same interruption policy as [`collect_chunks`].
pub async fn collect_events<S, E>(stream: S, progress: Progress<'_>) -> Vec<Value>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut stream = pin!(stream);
    let mut decoder = SseDecoder::default();
    let mut events = Vec::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                events.extend(decoder.push(&chunk));
                progress(&format!("Processing issue... ({} events received)", events.len()));
            }
            Err(err) => {
                warn!(error = %err, events = events.len(), "event stream interrupted, keeping partial events");
                break;
            }
        }
    }

    events.extend(decoder.finish());
    debug!(events = events.len(), "event stream complete");
    events
}

/// Incremental line decoder for Server-Sent Events.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; bytes are buffered
/// until a newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed one chunk and return the payloads of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            events.extend(Self::decode_line(&String::from_utf8_lossy(&line)));
        }
        events
    }

    /// Decode a trailing line that never got its newline.
    pub fn finish(&mut self) -> Vec<Value> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }

    fn decode_line(line: &str) -> Option<Value> {
        let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim();
        if data.is_empty() || data == "[DONE]" {
            return None;
        }
        match serde_json::from_str(data) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, line = data, "skipping malformed event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_server;
    use crate::response::{self, ResponseStatus};
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STREAM: &str = include_str!("../../tests/fixtures/stream.sse");

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn quiet(_: &str) {}

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"type\":\"sta").is_empty());
        let events = decoder.push(b"tus\",\"data\":{}}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "status");
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let mut decoder = SseDecoder::default();
        let line = "data: {\"step\":\"café\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.push(&line[..split]).is_empty());
        let events = decoder.push(&line[split..]);
        assert_eq!(events[0]["step"], "café");
    }

    #[test]
    fn test_decoder_skips_noise() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\nevent: status\ndata: \ndata: {broken\ndata: [DONE]\r\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_decoder_finish_flushes_trailing_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"n\":1}").is_empty());
        assert_eq!(decoder.finish().len(), 1);
        assert!(decoder.finish().is_empty());
    }

    #[tokio::test]
    async fn test_collect_events_fixture() {
        let events = collect_events(chunks(&[STREAM]), &quiet).await;
        assert_eq!(events.len(), 4);
        let parsed = response::parse_events(&events);
        assert_eq!(parsed.status, ResponseStatus::Success);
        assert_eq!(parsed.steps.len(), 3);
        assert_eq!(parsed.branch_name.as_deref(), Some("fix-issue-3"));
    }

    #[tokio::test]
    async fn test_collect_events_without_final_is_partial() {
        let body = "data: {\"type\":\"status\",\"data\":{\"step\":\"Cloning\",\"status\":\"completed\"}}\n";
        let events = collect_events(chunks(&[body]), &quiet).await;
        let parsed = response::parse_events(&events);
        assert_eq!(parsed.status, ResponseStatus::Partial);
        assert_eq!(parsed.summary, "Cloning");
    }

    #[tokio::test]
    async fn test_collect_events_keeps_events_before_error() {
        let parts = stream::iter(vec![
            Ok(Bytes::from_static(
                b"data: {\"type\":\"status\",\"data\":{\"step\":\"Cloning\",\"status\":\"completed\"}}\n",
            )),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from_static(b"data: {\"never\":true}\n")),
        ]);
        let events = collect_events(parts, &quiet).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_chunks_reports_progress() {
        let calls = AtomicUsize::new(0);
        let progress = |_: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let body = collect_chunks(chunks(&["{\"result\":", "\"complete\",", "\"details\":\"ok\"}"]), &progress).await;
        assert_eq!(body, r#"{"result":"complete","details":"ok"}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sse_stream_reads_http_response() {
        let url = test_server::serve_once(test_server::until_close("text/event-stream", STREAM)).await;
        let response = reqwest::get(url).await.unwrap();

        let calls = AtomicUsize::new(0);
        let progress = |_: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        match SseStream.read(response, &progress).await.unwrap() {
            RawPayload::Events(events) => {
                assert_eq!(events.len(), 4);
                assert_eq!(events[3]["type"], "final_response");
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_sse_stream_receive_normalizes() {
        let url = test_server::serve_once(test_server::until_close("text/event-stream", STREAM)).await;
        let response = reqwest::get(url).await.unwrap();

        let parsed = SseStream.receive(response, &quiet).await.unwrap();
        assert_eq!(parsed.status, ResponseStatus::Success);
        assert_eq!(parsed.steps.len(), 3);
        assert_eq!(
            parsed.pull_request_url.as_deref(),
            Some("https://github.com/octo/calculator/pull/6")
        );
    }

    #[tokio::test]
    async fn test_chunked_stream_reads_http_response() {
        let parts = ["{\"result\":", "\"complete\",", "\"details\":\"ok\"}"];
        let url = test_server::serve_once(test_server::chunked("application/json", &parts)).await;
        let response = reqwest::get(url).await.unwrap();

        match ChunkedStream.read(response, &quiet).await.unwrap() {
            RawPayload::Buffer(body) => assert_eq!(body, r#"{"result":"complete","details":"ok"}"#),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_source_for_transport() {
        assert_eq!(source_for(Transport::Json).name(), "json");
        assert_eq!(source_for(Transport::Chunked).name(), "chunked");
        let sse = source_for(Transport::Sse);
        assert_eq!(sse.name(), "sse");
        assert_eq!(sse.accept(), "text/event-stream");
    }
}
