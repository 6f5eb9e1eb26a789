//! InferenceGateway trait — the abstraction over the model server.
//!
//! A gateway knows how to send a transcript snapshot to a model and get a
//! reply back, either as one complete text or as a stream of fragments.
//!
//! Implementations: Ollama (`taconite-providers`), scripted mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::message::ChatTurn;
use crate::transcript::Transcript;

/// A request to the model server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// The model to use (e.g. "llama3.1:8b")
    pub model: String,

    /// Snapshot of the transcript, oldest first
    pub messages: Vec<ChatTurn>,
}

impl InferenceRequest {
    /// Snapshot `transcript` for inference with its own model.
    pub fn for_transcript(transcript: &Transcript) -> Self {
        Self {
            model: transcript.model().to_string(),
            messages: transcript.snapshot_for_inference(),
        }
    }
}

/// One incremental piece of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Text delta, possibly empty
    #[serde(default)]
    pub content: String,

    /// Whether this is the final fragment
    #[serde(default)]
    pub done: bool,
}

impl Fragment {
    pub fn new(content: impl Into<String>, done: bool) -> Self {
        Self {
            content: content.into(),
            done,
        }
    }
}

/// Receiving end of a streamed reply. Finite and not restartable; dropping it
/// abandons the stream.
pub type FragmentStream = mpsc::Receiver<Result<Fragment, GatewayError>>;

/// The core gateway trait.
///
/// The assembler calls `send_batch()` or `send_stream()` without knowing which
/// server is behind it. Timeouts and retries, if any, belong to the implementation.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// A human-readable name for this gateway (e.g. "ollama").
    fn name(&self) -> &str;

    /// Send a request and wait for the complete reply.
    async fn send_batch(&self, request: InferenceRequest) -> Result<String, GatewayError>;

    /// Send a request and get a stream of reply fragments.
    ///
    /// Default implementation calls `send_batch()` and wraps the reply as a
    /// single final fragment.
    async fn send_stream(&self, request: InferenceRequest) -> Result<FragmentStream, GatewayError> {
        let content = self.send_batch(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(Fragment::new(content, true))).await;
        Ok(rx)
    }

    /// List models the server can run.
    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the server?
    async fn health_check(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }
}
