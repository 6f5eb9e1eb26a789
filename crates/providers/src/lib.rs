//! Inference gateway implementations for Taconite.
//!
//! All gateways implement the `taconite_core::InferenceGateway` trait.

pub mod ollama;

pub use ollama::{NdjsonDecoder, OllamaGateway};
