//! Bounded-context transcript.
//!
//! A `Transcript` is the ordered message history of one session together with
//! a running token estimate. Every append is followed by an eviction pass that
//! drops the oldest messages until the estimate fits the budget again, never
//! touching a leading system prompt and never going below two non-system
//! messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::estimator::TokenEstimator;
use crate::message::{ChatTurn, Message, Role};
use crate::session::SessionId;

/// Characters of an evicted message kept in its notice.
pub const EVICTION_PREVIEW_CHARS: usize = 30;

/// Emitted once per message removed by the budget policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionNotice {
    pub session_id: SessionId,
    pub removed_role: Role,
    pub content_preview: String,
    pub tokens_freed: usize,
}

/// Receives eviction notices. Rendering and logging of them live outside the core.
pub trait EvictionObserver: Send + Sync {
    fn on_evicted(&self, notice: &EvictionNotice);
}

/// Read-only description of a transcript, without its messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMeta {
    pub id: SessionId,
    pub name: String,
    pub model: String,
    pub max_tokens: usize,
    pub token_count: usize,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Per-role message counts plus budget usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptStats {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
    pub system: usize,
    pub token_count: usize,
    pub max_tokens: usize,
}

impl TranscriptStats {
    /// Token estimate as a percentage of the budget.
    pub fn usage_percent(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.token_count as f64 * 100.0 / self.max_tokens as f64
    }
}

pub struct Transcript {
    id: SessionId,
    name: String,
    model: String,
    max_tokens: usize,
    token_count: usize,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
    estimator: Arc<dyn TokenEstimator>,
    observer: Option<Arc<dyn EvictionObserver>>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        model: impl Into<String>,
        max_tokens: usize,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            model: model.into(),
            max_tokens,
            token_count: 0,
            messages: Vec::new(),
            created_at: now,
            last_used_at: now,
            estimator,
            observer: None,
        }
    }

    /// Attach an observer for eviction notices.
    pub fn with_observer(mut self, observer: Arc<dyn EvictionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn EvictionObserver>>) {
        self.observer = observer;
    }

    /// Append a message stamped now, then enforce the budget.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Message {
        let message = Message::new(role, content);
        self.push(message.clone());
        message
    }

    /// Append a previously persisted message, keeping its timestamp.
    ///
    /// Goes through the same accounting and eviction as `append`.
    pub(crate) fn replay(&mut self, message: Message) {
        self.push(message);
    }

    fn push(&mut self, message: Message) {
        self.token_count += self.estimator.estimate(&message.content);
        self.last_used_at = message.timestamp;
        self.messages.push(message);
        self.evict_over_budget();
    }

    /// Greedy FIFO eviction down to the floor of `(leading system) + 2` messages.
    fn evict_over_budget(&mut self) {
        if self.token_count <= self.max_tokens {
            return;
        }

        let start = usize::from(self.leading_system());

        while self.token_count > self.max_tokens && self.messages.len() > start + 2 {
            let removed = self.messages.remove(start);
            let freed = self.estimator.estimate(&removed.content);
            self.token_count = self.token_count.saturating_sub(freed);

            let notice = EvictionNotice {
                session_id: self.id.clone(),
                removed_role: removed.role,
                content_preview: removed.preview(EVICTION_PREVIEW_CHARS),
                tokens_freed: freed,
            };
            debug!(
                session = %self.id,
                role = %notice.removed_role,
                tokens_freed = freed,
                token_count = self.token_count,
                max_tokens = self.max_tokens,
                "Evicted message over budget"
            );
            if let Some(observer) = &self.observer {
                observer.on_evicted(&notice);
            }
        }
    }

    fn leading_system(&self) -> bool {
        self.messages
            .first()
            .is_some_and(|m| m.role == Role::System)
    }

    /// The role/content sequence sent to the inference server.
    pub fn snapshot_for_inference(&self) -> Vec<ChatTurn> {
        self.messages.iter().map(ChatTurn::from).collect()
    }

    /// Drop every message. The system prompt is not re-inserted.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.token_count = 0;
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The last `n` messages (fewer if the transcript is shorter).
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.last_used_at
    }

    pub(crate) fn set_timestamps(&mut self, created_at: DateTime<Utc>, last_used_at: DateTime<Utc>) {
        self.created_at = created_at;
        self.last_used_at = last_used_at;
    }

    pub fn meta(&self) -> TranscriptMeta {
        TranscriptMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            token_count: self.token_count,
            message_count: self.messages.len(),
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }

    pub fn stats(&self) -> TranscriptStats {
        let count = |role: Role| self.messages.iter().filter(|m| m.role == role).count();
        TranscriptStats {
            total: self.messages.len(),
            user: count(Role::User),
            assistant: count(Role::Assistant),
            system: count(Role::System),
            token_count: self.token_count,
            max_tokens: self.max_tokens,
        }
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("token_count", &self.token_count)
            .field("messages", &self.messages.len())
            .finish()
    }
}
