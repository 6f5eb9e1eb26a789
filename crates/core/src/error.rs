//! Error types for the Taconite domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::session::SessionId;

/// The top-level error type for all Taconite operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Inference errors ---
    #[error("Inference error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Session registry errors ---
    #[error("Session error: {0}")]
    Registry(#[from] RegistryError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the inference server.
///
/// Never retried inside the core; a failed call leaves the transcript with the
/// user's message and no assistant reply.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    /// A short operator-facing tip for the failures that usually have a
    /// local cause.
    pub fn troubleshooting_hint(&self) -> Option<&'static str> {
        match self {
            Self::ConnectionRefused(_) => {
                Some("Make sure Ollama is running with `ollama serve`")
            }
            Self::Timeout(_) => {
                Some("The model might still be processing. Try a shorter message.")
            }
            Self::ModelNotFound(_) => Some("Pull the model first with `ollama pull <model>`"),
            _ => None,
        }
    }
}

/// Precondition violations on the session registry. Always surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Session already exists: {0}")]
    DuplicateSession(SessionId),

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Cannot delete the current session {0}; switch to another session first")]
    CannotDeleteCurrent(SessionId),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Saved conversation not found: {0}")]
    NotFound(String),

    #[error("Invalid conversation name: {0:?}")]
    InvalidName(String),

    #[error("Storage error: {0}")]
    Io(String),

    #[error("Failed to encode conversation: {0}")]
    Serialization(String),
}
