//! Session registry. Owns every live transcript and tracks the current one.
//!
//! The registry is an in-memory, single-writer structure. Callers that share
//! it between concurrent requests must serialize turns per session themselves.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::estimator::TokenEstimator;
use crate::export::SavedConversation;
use crate::message::Role;
use crate::session::SessionId;
use crate::transcript::{EvictionObserver, Transcript, TranscriptMeta};

/// Everything needed to open a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub id: SessionId,
    pub name: String,
    pub model: String,
    /// Appended as the leading system message when non-empty.
    pub system_prompt: String,
    pub max_tokens: usize,
}

impl SessionSpec {
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        max_tokens: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            max_tokens,
        }
    }
}

/// One row of `SessionRegistry::list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub meta: TranscriptMeta,
    pub current: bool,
}

pub struct SessionRegistry {
    sessions: HashMap<SessionId, Transcript>,
    /// Insertion order, for stable listing.
    order: Vec<SessionId>,
    current: SessionId,
    estimator: Arc<dyn TokenEstimator>,
    observer: Option<Arc<dyn EvictionObserver>>,
}

impl SessionRegistry {
    /// Create a registry seeded with `seed` as the current session.
    pub fn new(
        seed: SessionSpec,
        estimator: Arc<dyn TokenEstimator>,
        observer: Option<Arc<dyn EvictionObserver>>,
    ) -> Self {
        let mut registry = Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            current: seed.id.clone(),
            estimator,
            observer,
        };
        let transcript = registry.build(&seed);
        registry.insert(transcript);
        registry
    }

    fn build(&self, spec: &SessionSpec) -> Transcript {
        let mut transcript = Transcript::new(
            spec.id.clone(),
            spec.name.clone(),
            spec.model.clone(),
            spec.max_tokens,
            self.estimator.clone(),
        );
        transcript.set_observer(self.observer.clone());
        if !spec.system_prompt.is_empty() {
            transcript.append(Role::System, spec.system_prompt.clone());
        }
        transcript
    }

    fn insert(&mut self, transcript: Transcript) -> &mut Transcript {
        let id = transcript.id().clone();
        self.order.push(id.clone());
        self.sessions.entry(id).or_insert(transcript)
    }

    /// Open a new session. Does not change the current session.
    pub fn create(&mut self, spec: SessionSpec) -> Result<&mut Transcript, RegistryError> {
        if self.sessions.contains_key(&spec.id) {
            return Err(RegistryError::DuplicateSession(spec.id));
        }
        let transcript = self.build(&spec);
        info!(session = %spec.id, name = %spec.name, model = %spec.model, "Session created");
        Ok(self.insert(transcript))
    }

    /// Rebuild a persisted conversation.
    ///
    /// Skips the system-prompt auto-append: the saved messages are replayed as
    /// they were, timestamps included, through the normal token accounting.
    pub fn restore(&mut self, saved: SavedConversation) -> Result<&mut Transcript, RegistryError> {
        let SavedConversation { meta, messages, config } = saved;
        if self.sessions.contains_key(&meta.id) {
            return Err(RegistryError::DuplicateSession(meta.id));
        }

        let mut transcript = Transcript::new(
            meta.id.clone(),
            meta.name,
            config.model,
            config.max_tokens,
            self.estimator.clone(),
        );
        transcript.set_observer(self.observer.clone());
        for message in messages {
            transcript.replay(message);
        }
        transcript.set_timestamps(meta.created, meta.last_used);

        info!(session = %meta.id, messages = transcript.len(), "Session restored");
        Ok(self.insert(transcript))
    }

    /// Point the current session at `id`. No data is copied.
    pub fn switch_current(&mut self, id: &SessionId) -> Result<(), RegistryError> {
        if !self.sessions.contains_key(id) {
            return Err(RegistryError::NotFound(id.clone()));
        }
        debug!(from = %self.current, to = %id, "Switching current session");
        self.current = id.clone();
        Ok(())
    }

    pub fn current_id(&self) -> &SessionId {
        &self.current
    }

    pub fn current(&self) -> &Transcript {
        // `current` always names a registered session: it is seeded in `new`,
        // only reassigned to present keys, and `delete` refuses to remove it.
        self.sessions
            .get(&self.current)
            .expect("current session is always registered")
    }

    pub fn current_mut(&mut self) -> &mut Transcript {
        self.sessions
            .get_mut(&self.current)
            .expect("current session is always registered")
    }

    pub fn get(&self, id: &SessionId) -> Option<&Transcript> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Transcript> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Every session, in creation order.
    pub fn list(&self) -> Vec<SessionSummary> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .map(|t| SessionSummary {
                meta: t.meta(),
                current: *t.id() == self.current,
            })
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Remove a session. The current session must be switched away from first.
    pub fn delete(&mut self, id: &SessionId) -> Result<Transcript, RegistryError> {
        if *id == self.current {
            return Err(RegistryError::CannotDeleteCurrent(id.clone()));
        }
        let removed = self
            .sessions
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        self.order.retain(|existing| existing != id);
        info!(session = %id, "Session deleted");
        Ok(removed)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.order)
            .field("current", &self.current)
            .finish()
    }
}
