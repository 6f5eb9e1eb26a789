//! Conversation persistence for Taconite.
//!
//! Implementations of `taconite_core::ConversationStore`:
//! - [`FileStore`] — pretty JSON files under a save directory
//! - [`InMemoryStore`] — ephemeral, for tests and servers

pub mod file_store;
pub mod in_memory;

pub use file_store::FileStore;
pub use in_memory::InMemoryStore;

use taconite_core::error::StoreError;

/// Validate a save name and strip an optional `.json` suffix.
///
/// Names become file stems, so path separators and dot-only names are refused.
pub fn normalize_name(name: &str) -> Result<&str, StoreError> {
    let trimmed = name.trim();
    let stem = trimmed.strip_suffix(".json").unwrap_or(trimmed);

    let invalid = stem.is_empty()
        || stem.chars().all(|c| c == '.')
        || stem.contains(['/', '\\'])
        || stem.chars().any(char::is_control);

    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(stem)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use taconite_core::export::{ConversationMeta, SavedConversation, SessionConfig};
    use taconite_core::message::Message;
    use taconite_core::session::SessionId;

    pub(crate) fn sample(id: &str, contents: &[&str]) -> SavedConversation {
        let now = Utc::now();
        let messages: Vec<Message> = contents.iter().map(|c| Message::user(*c)).collect();
        SavedConversation {
            meta: ConversationMeta {
                id: SessionId::from(id),
                name: "Sample".into(),
                created: now,
                last_used: now,
                message_count: messages.len(),
            },
            messages,
            config: SessionConfig {
                model: "llama3.1:8b".into(),
                system_prompt: "You are Taconite.".into(),
                max_tokens: 4000,
                stream_mode: true,
            },
        }
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("work").unwrap(), "work");
        assert_eq!(normalize_name(" work.json ").unwrap(), "work");
        assert_eq!(normalize_name("v1.2-notes").unwrap(), "v1.2-notes");
    }

    #[test]
    fn bad_names_rejected() {
        for bad in ["", "   ", ".json", "..", "a/b", "a\\b", "../x"] {
            assert!(
                matches!(normalize_name(bad), Err(StoreError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
