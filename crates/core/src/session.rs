//! Session identifiers.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name given to the session seeded at startup.
pub const DEFAULT_SESSION_NAME: &str = "Default Chat";

/// Name for a session opened without one, e.g. `Conversation 14:05`.
pub fn default_session_name(at: DateTime<Local>) -> String {
    format!("Conversation {}", at.format("%H:%M"))
}

/// Unique identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Id of the session seeded at startup.
    pub const DEFAULT: &'static str = "default";

    /// A fresh id of the form `conv_1a2b3c4d`.
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("conv_{}", &uuid[..8]))
    }

    pub fn default_session() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
