//! Ollama gateway implementation.
//!
//! Talks to a local (or remote) Ollama server over its native `/api/chat`
//! endpoint. Supports:
//! - Batch replies (`stream: false`, one JSON object)
//! - Streamed replies (`stream: true`, newline-delimited JSON)
//! - Model listing and health checks via `/api/tags`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use taconite_config::InferenceConfig;
use taconite_core::error::GatewayError;
use taconite_core::inference::{Fragment, FragmentStream, InferenceGateway, InferenceRequest};
use taconite_core::message::ChatTurn;
use tracing::{debug, trace, warn};

/// An Ollama inference gateway.
///
/// Batch and stream calls use separate HTTP clients because a streamed reply
/// may legitimately stay open much longer than a batch one.
pub struct OllamaGateway {
    base_url: String,
    batch_client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl OllamaGateway {
    /// Create a gateway for the server at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        batch_timeout: Duration,
        stream_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let batch_client = reqwest::Client::builder()
            .timeout(batch_timeout)
            .build()
            .map_err(|e| GatewayError::NotConfigured(format!("HTTP client: {e}")))?;

        let stream_client = reqwest::Client::builder()
            .timeout(stream_timeout)
            .build()
            .map_err(|e| GatewayError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_client,
            stream_client,
        })
    }

    /// Create a gateway from the `[inference]` config section.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.host.clone(),
            Duration::from_secs(config.batch_timeout_secs),
            Duration::from_secs(config.stream_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_body<'a>(request: &'a InferenceRequest, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &request.model,
            messages: &request.messages,
            stream,
        }
    }

    async fn fetch_tags(&self) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}/api/tags", self.base_url);
        self.batch_client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.base_url))
    }
}

#[async_trait]
impl InferenceGateway for OllamaGateway {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send_batch(&self, request: InferenceRequest) -> Result<String, GatewayError> {
        let url = format!("{}/api/chat", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending batch chat request"
        );

        let response = self
            .batch_client
            .post(&url)
            .json(&Self::chat_body(&request, false))
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.base_url))?;

        let response = check_status(response, &request.model).await?;

        let reply: ChatChunk = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(e.to_string())
            } else {
                GatewayError::Decode(format!("Failed to parse chat response: {e}"))
            }
        })?;

        if let Some(error) = reply.error {
            return Err(GatewayError::ApiError {
                status_code: 200,
                message: error,
            });
        }

        Ok(reply.message.map(|m| m.content).unwrap_or_default())
    }

    async fn send_stream(&self, request: InferenceRequest) -> Result<FragmentStream, GatewayError> {
        let url = format!("{}/api/chat", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending streaming chat request"
        );

        let response = self
            .stream_client
            .post(&url)
            .json(&Self::chat_body(&request, true))
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.base_url))?;

        let response = check_status(response, &request.model).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Spawn task to read the NDJSON byte stream and decode fragments
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = NdjsonDecoder::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let err = if e.is_timeout() {
                            GatewayError::Timeout(e.to_string())
                        } else {
                            GatewayError::StreamInterrupted(e.to_string())
                        };
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                };

                for item in decoder.push(&bytes) {
                    let stop = match &item {
                        Ok(fragment) => fragment.done,
                        Err(_) => true,
                    };
                    if tx.send(item).await.is_err() {
                        trace!("Fragment receiver dropped, abandoning stream");
                        return;
                    }
                    if stop {
                        return;
                    }
                }
            }

            // Body ended; a final line may lack its newline
            if let Some(item) = decoder.finish() {
                let _ = tx.send(item).await;
            }
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        let response = self.fetch_tags().await?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> Result<bool, GatewayError> {
        let response = self.fetch_tags().await?;
        Ok(response.status().is_success())
    }
}

/// Map a transport failure to the gateway's error vocabulary.
fn map_send_error(err: reqwest::Error, base_url: &str) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string())
    } else if err.is_connect() {
        GatewayError::ConnectionRefused(format!("Cannot connect to Ollama at {base_url}"))
    } else {
        GatewayError::Network(err.to_string())
    }
}

/// Reject non-2xx responses, extracting Ollama's `{"error": "..."}` message
/// when present.
async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);

    warn!(status = status.as_u16(), body = %message, "Ollama returned error");

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GatewayError::ModelNotFound(model.to_string()));
    }

    Err(GatewayError::ApiError {
        status_code: status.as_u16(),
        message,
    })
}

/// Incremental decoder for Ollama's newline-delimited JSON stream.
///
/// Bytes are buffered until a full line arrives, so multi-byte characters and
/// objects split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    /// Feed raw bytes; returns every fragment completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Fragment, GatewayError>> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = decode_line(&line[..line.len() - 1]) {
                out.push(item);
            }
        }
        out
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<Result<Fragment, GatewayError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

/// Decode one NDJSON line. Blank lines yield nothing.
fn decode_line(raw: &[u8]) -> Option<Result<Fragment, GatewayError>> {
    let line = match std::str::from_utf8(raw) {
        Ok(s) => s.trim(),
        Err(e) => return Some(Err(GatewayError::Decode(format!("Invalid UTF-8: {e}")))),
    };

    if line.is_empty() {
        return None;
    }

    let chunk: ChatChunk = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => {
            return Some(Err(GatewayError::Decode(format!(
                "Malformed stream line: {e}"
            ))));
        }
    };

    if let Some(error) = chunk.error {
        return Some(Err(GatewayError::StreamInterrupted(error)));
    }

    Some(Ok(Fragment {
        content: chunk.message.map(|m| m.content).unwrap_or_default(),
        done: chunk.done,
    }))
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
}

/// Both the batch response and each stream line share this shape.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}
