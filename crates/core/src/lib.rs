//! # Taconite Core
//!
//! Domain types, traits, and error definitions for the Taconite chat client.
//! This crate has **no transport or UI dependencies**; it holds the
//! bounded-context conversation manager that every other crate builds on:
//!
//! - [`TokenEstimator`] — pluggable text → token cost policy
//! - [`Transcript`] — one session's messages under a token budget, with eviction
//! - [`SessionRegistry`] — all live transcripts plus the current one
//! - [`InferenceGateway`] — the seam to the model server
//! - [`ConversationStore`] — the seam to persistence

pub mod error;
pub mod estimator;
pub mod export;
pub mod inference;
pub mod message;
pub mod registry;
pub mod session;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GatewayError, RegistryError, Result, StoreError};
pub use estimator::{CharRatioEstimator, TokenEstimator};
pub use export::{ConversationMeta, ConversationStore, SavedConversation, SavedEntry, SessionConfig};
pub use inference::{Fragment, FragmentStream, InferenceGateway, InferenceRequest};
pub use message::{ChatTurn, Message, Role};
pub use registry::{SessionRegistry, SessionSpec, SessionSummary};
pub use session::SessionId;
pub use transcript::{EvictionNotice, EvictionObserver, Transcript, TranscriptMeta, TranscriptStats};
