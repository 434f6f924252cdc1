// Planora Client — Streaming generation & chat
//
// The generation endpoints and the chat endpoint answer with
// server-sent-event-style bodies: one JSON chunk per `data: ` line, with
// `data: [DONE]` (or a chunk carrying `done: true`) terminating the stream.
//
// Consumption: byte stream → line buffer → `data: ` prefix strip → JSON
// parse. Deltas are forwarded through an optional unbounded channel as they
// arrive, and the collected chunks are returned once the stream ends. The
// credential policy runs before the stream starts (the POST goes through
// `execute`); anything that goes wrong mid-stream is a `Stream` error.

use crate::atoms::constants::*;
use crate::atoms::error::{ClientError, ClientResult};
use crate::atoms::types::{ChatMessage, GenerationKind, StreamChunk};
use crate::http::ApiClient;
use futures::StreamExt;
use log::info;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

impl ApiClient {
    /// Run one of the generation endpoints, streaming deltas into
    /// `delta_tx` when provided.
    pub async fn generate(
        &self,
        kind: GenerationKind,
        payload: &Value,
        delta_tx: Option<&UnboundedSender<StreamChunk>>,
    ) -> ClientResult<Vec<StreamChunk>> {
        let path = match kind {
            GenerationKind::Positioning => PATH_GENERATE_POSITIONING,
            GenerationKind::Topics => PATH_GENERATE_TOPICS,
            GenerationKind::Script => PATH_GENERATE_SCRIPT,
        };
        self.stream_request(path, payload.clone(), delta_tx).await
    }

    /// Send a chat turn and stream the assistant's reply.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        delta_tx: Option<&UnboundedSender<StreamChunk>>,
    ) -> ClientResult<Vec<StreamChunk>> {
        let body = json!({ "messages": messages });
        self.stream_request(PATH_CHAT_STREAM, body, delta_tx).await
    }

    async fn stream_request(
        &self,
        path: &str,
        body: Value,
        delta_tx: Option<&UnboundedSender<StreamChunk>>,
    ) -> ClientResult<Vec<StreamChunk>> {
        info!("[generate] Streaming request to {}", path);
        let response = self.execute(Method::POST, path, Some(body)).await?;

        let mut chunks = Vec::new();
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(result) = byte_stream.next().await {
            let bytes = result
                .map_err(|e| ClientError::Stream(format!("Stream read error: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Process complete SSE lines; partial lines stay buffered.
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                let Some(data) = line.strip_prefix("data: ") else { continue };
                if absorb_data_line(data, &mut chunks, delta_tx)? {
                    return Ok(chunks);
                }
            }
        }

        // Servers may end the stream without a trailing newline; flush the
        // remainder through the same handling.
        if let Some(data) = buffer.trim().strip_prefix("data: ") {
            absorb_data_line(data, &mut chunks, delta_tx)?;
        }

        Ok(chunks)
    }
}

/// Handle one `data: ` payload: parse, forward, collect. Returns `true`
/// when the stream is terminated (`[DONE]` or a `done` chunk).
fn absorb_data_line(
    data: &str,
    chunks: &mut Vec<StreamChunk>,
    delta_tx: Option<&UnboundedSender<StreamChunk>>,
) -> ClientResult<bool> {
    if data == "[DONE]" {
        return Ok(true);
    }
    let Some(chunk) = parse_sse_chunk(data) else { return Ok(false) };
    if let Some(error) = chunk.error {
        return Err(ClientError::Stream(error));
    }
    if let Some(tx) = delta_tx {
        let _ = tx.send(chunk.clone());
    }
    let done = chunk.done;
    chunks.push(chunk);
    Ok(done)
}

/// Parse a single SSE data payload into a chunk.
fn parse_sse_chunk(data: &str) -> Option<StreamChunk> {
    let v: Value = serde_json::from_str(data).ok()?;
    let delta_text = v["delta"]
        .as_str()
        .or_else(|| v["content"].as_str())
        .or_else(|| v["text"].as_str())
        .map(|s| s.to_string());
    let done = v["done"].as_bool().unwrap_or(false);
    let generation_id = v["generation_id"]
        .as_str()
        .or_else(|| v["generationId"].as_str())
        .map(|s| s.to_string());
    let error = v["error"].as_str().map(|s| s.to_string());
    Some(StreamChunk { delta_text, done, generation_id, error })
}

/// Join the delta fragments of a finished stream into the full text.
pub fn collect_text(chunks: &[StreamChunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| c.delta_text.as_deref())
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::TokenPair;
    use crate::auth::store::TokenStore;
    use crate::events::SessionEvents;
    use crate::testutil::{http_response, sse_response, StubServer};
    use std::sync::Arc;

    fn client_with(base_url: &str) -> ApiClient {
        let store = Arc::new(TokenStore::open_in_memory().unwrap());
        store
            .set_tokens(&TokenPair { access_token: "tok".into(), refresh_token: "ref".into() })
            .unwrap();
        ApiClient::new(base_url, store, SessionEvents::new()).unwrap()
    }

    #[test]
    fn parse_chunk_field_variants() {
        let c = parse_sse_chunk(r#"{"delta": "Hello"}"#).unwrap();
        assert_eq!(c.delta_text.as_deref(), Some("Hello"));
        assert!(!c.done);

        let c = parse_sse_chunk(r#"{"content": "Hi"}"#).unwrap();
        assert_eq!(c.delta_text.as_deref(), Some("Hi"));

        let c = parse_sse_chunk(r#"{"done": true, "generationId": "g-1"}"#).unwrap();
        assert!(c.done);
        assert_eq!(c.generation_id.as_deref(), Some("g-1"));

        assert!(parse_sse_chunk("not json").is_none());
    }

    #[test]
    fn collect_text_joins_deltas_in_order() {
        let chunks = vec![
            StreamChunk { delta_text: Some("Plan ".into()), ..Default::default() },
            StreamChunk { delta_text: None, ..Default::default() },
            StreamChunk { delta_text: Some("your week".into()), done: true, ..Default::default() },
        ];
        assert_eq!(collect_text(&chunks), "Plan your week");
    }

    #[tokio::test]
    async fn chat_stream_collects_chunks_and_forwards_deltas() {
        let server = StubServer::start(vec![
            http_response(200, "OK", r#"{"csrf_token":"c-1"}"#),
            sse_response(&[
                r#"{"delta": "Three "}"#,
                r#"{"delta": "topic ideas"}"#,
                r#"{"done": true, "generation_id": "g-42"}"#,
            ]),
        ])
        .await;
        let client = client_with(&server.base_url);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let chunks = client
            .chat_stream(&[ChatMessage::user("give me topics")], Some(&tx))
            .await
            .unwrap();

        assert_eq!(collect_text(&chunks), "Three topic ideas");
        assert_eq!(chunks.last().unwrap().generation_id.as_deref(), Some("g-42"));

        // Deltas were forwarded live, in order.
        assert_eq!(rx.recv().await.unwrap().delta_text.as_deref(), Some("Three "));
        assert_eq!(rx.recv().await.unwrap().delta_text.as_deref(), Some("topic ideas"));
        server.finish().await;
    }

    #[tokio::test]
    async fn generate_stops_on_done_sentinel() {
        let server = StubServer::start(vec![
            http_response(200, "OK", r#"{"csrf_token":"c-1"}"#),
            sse_response(&[r#"{"delta": "niche: gardening"}"#, "[DONE]"]),
        ])
        .await;
        let client = client_with(&server.base_url);

        let chunks = client
            .generate(
                GenerationKind::Positioning,
                &serde_json::json!({"handle": "@greenthumb"}),
                None,
            )
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(collect_text(&chunks), "niche: gardening");
        server.finish().await;
    }

    #[tokio::test]
    async fn trailing_data_line_without_newline_is_flushed() {
        let body = r#"data: {"delta": "tail without newline"}"#;
        let raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let server = StubServer::start(vec![
            http_response(200, "OK", r#"{"csrf_token":"c-1"}"#),
            raw,
        ])
        .await;
        let client = client_with(&server.base_url);

        let chunks = client
            .generate(GenerationKind::Topics, &serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(collect_text(&chunks), "tail without newline");
        server.finish().await;
    }

    #[tokio::test]
    async fn in_stream_error_surfaces_as_stream_error() {
        let server = StubServer::start(vec![
            http_response(200, "OK", r#"{"csrf_token":"c-1"}"#),
            sse_response(&[r#"{"delta": "partial"}"#, r#"{"error": "model overloaded"}"#]),
        ])
        .await;
        let client = client_with(&server.base_url);

        let err = client
            .generate(GenerationKind::Script, &serde_json::json!({}), None)
            .await
            .unwrap_err();
        match err {
            ClientError::Stream(msg) => assert_eq!(msg, "model overloaded"),
            other => panic!("unexpected error: {:?}", other),
        }
        server.finish().await;
    }
}
