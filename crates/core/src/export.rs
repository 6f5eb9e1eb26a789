//! Persistence seam — the read-only export of a transcript and the store trait.
//!
//! The core only produces `SavedConversation`s and consumes them again through
//! `SessionRegistry::restore`; how they are written is up to the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::Message;
use crate::session::SessionId;
use crate::transcript::Transcript;

/// Header of a saved conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub id: SessionId,
    pub name: String,
    pub created: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub message_count: usize,
}

/// Session settings recorded alongside a saved conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: usize,
    pub stream_mode: bool,
}

/// Everything needed to rebuild a transcript later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedConversation {
    pub meta: ConversationMeta,
    pub messages: Vec<Message>,
    pub config: SessionConfig,
}

impl SavedConversation {
    /// Export `transcript`. `config.model` and `config.max_tokens` are taken from
    /// the transcript itself.
    pub fn from_transcript(transcript: &Transcript, config: SessionConfig) -> Self {
        Self {
            meta: ConversationMeta {
                id: transcript.id().clone(),
                name: transcript.name().to_string(),
                created: transcript.created_at(),
                last_used: transcript.last_used_at(),
                message_count: transcript.len(),
            },
            messages: transcript.messages().to_vec(),
            config: SessionConfig {
                model: transcript.model().to_string(),
                max_tokens: transcript.max_tokens(),
                ..config
            },
        }
    }
}

/// A saved conversation as seen by a listing. `meta` is `None` when the entry
/// exists but could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedEntry {
    pub name: String,
    pub meta: Option<ConversationMeta>,
}

/// Where saved conversations live. Last write wins.
pub trait ConversationStore: Send + Sync {
    fn name(&self) -> &str;

    fn save(&self, name: &str, conversation: &SavedConversation) -> Result<(), StoreError>;

    fn load(&self, name: &str) -> Result<SavedConversation, StoreError>;

    /// Saved entries sorted by name.
    fn list(&self) -> Result<Vec<SavedEntry>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::CharRatioEstimator;
    use crate::message::Role;
    use std::sync::Arc;

    #[test]
    fn export_captures_transcript_state() {
        let mut t = Transcript::new(
            SessionId::from("default"),
            "Default Chat",
            "llama3.1:8b",
            4000,
            Arc::new(CharRatioEstimator::default()),
        );
        t.append(Role::System, "You are Taconite.");
        t.append(Role::User, "hi");

        let saved = SavedConversation::from_transcript(
            &t,
            SessionConfig {
                model: "ignored".into(),
                system_prompt: "You are Taconite.".into(),
                max_tokens: 1,
                stream_mode: true,
            },
        );

        assert_eq!(saved.meta.id.as_str(), "default");
        assert_eq!(saved.meta.message_count, 2);
        assert_eq!(saved.meta.last_used, t.last_used_at());
        assert_eq!(saved.messages, t.messages());
        assert_eq!(saved.config.model, "llama3.1:8b");
        assert_eq!(saved.config.max_tokens, 4000);
        assert!(saved.config.stream_mode);
    }

    #[test]
    fn saved_conversation_json_shape() {
        let now = Utc::now();
        let saved = SavedConversation {
            meta: ConversationMeta {
                id: SessionId::from("c1"),
                name: "Chat".into(),
                created: now,
                last_used: now,
                message_count: 0,
            },
            messages: vec![],
            config: SessionConfig {
                model: "m".into(),
                system_prompt: String::new(),
                max_tokens: 10,
                stream_mode: false,
            },
        };
        let value = serde_json::to_value(&saved).unwrap();
        assert_eq!(value["meta"]["id"], "c1");
        assert_eq!(value["config"]["stream_mode"], false);
        assert!(value["messages"].as_array().unwrap().is_empty());
    }
}
