//! Reply streaming events.
//!
//! `ReplyStreamEvent` wraps gateway fragments into events that the HTTP
//! server forwards to clients over SSE.

use serde::{Deserialize, Serialize};

/// Events emitted while a streamed reply is assembled.
///
/// - `chunk` — partial reply text
/// - `done`  — reply committed to the transcript
/// - `error` — the reply failed; nothing was committed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyStreamEvent {
    /// Partial text from the model.
    Chunk { content: String },

    /// The reply is complete and committed.
    Done {
        conversation_id: String,
        reply: String,
        token_count: usize,
        message_count: usize,
    },

    /// The reply failed.
    Error { message: String },
}

impl ReplyStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }
}
