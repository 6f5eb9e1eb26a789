//! In-memory store, useful for testing and for servers without a save directory.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use taconite_core::error::StoreError;
use taconite_core::export::{ConversationStore, SavedConversation, SavedEntry};

use crate::normalize_name;

/// Keeps saved conversations in a sorted map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, SavedConversation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn save(&self, name: &str, conversation: &SavedConversation) -> Result<(), StoreError> {
        let name = normalize_name(name)?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), conversation.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<SavedConversation, StoreError> {
        let name = normalize_name(name)?;
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn list(&self) -> Result<Vec<SavedEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, saved)| SavedEntry {
                name: name.clone(),
                meta: Some(saved.meta.clone()),
            })
            .collect())
    }
}
