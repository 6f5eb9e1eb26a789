//! Subcommand implementations and the wiring they share.

pub mod ask;
pub mod chat;
pub mod init;
pub mod saved;
pub mod serve;

use std::sync::Arc;
use std::time::Duration;

use taconite_chat::ResponseAssembler;
use taconite_config::AppConfig;
use taconite_core::error::GatewayError;
use taconite_core::estimator::CharRatioEstimator;
use taconite_core::export::SessionConfig;
use taconite_core::registry::{SessionRegistry, SessionSpec};
use taconite_core::session::{DEFAULT_SESSION_NAME, SessionId};
use taconite_providers::OllamaGateway;

use crate::render::TerminalRenderer;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// A registry holding the default session, reporting evictions to `renderer`.
pub(crate) fn seed_registry(config: &AppConfig, renderer: Arc<TerminalRenderer>) -> SessionRegistry {
    SessionRegistry::new(
        SessionSpec::new(
            SessionId::default_session(),
            DEFAULT_SESSION_NAME,
            config.model.clone(),
            config.system_prompt.clone(),
            config.max_tokens,
        ),
        Arc::new(CharRatioEstimator::new(config.chars_per_token)),
        Some(renderer),
    )
}

/// An Ollama-backed assembler drawing its spinner and streamed text on `renderer`.
pub(crate) fn build_assembler(
    config: &AppConfig,
    renderer: Arc<TerminalRenderer>,
) -> Result<ResponseAssembler, GatewayError> {
    let gateway = Arc::new(OllamaGateway::from_config(&config.inference)?);
    Ok(ResponseAssembler::new(gateway)
        .with_indicator(renderer.clone())
        .with_observer(renderer)
        .with_tick(Duration::from_millis(config.ui.spinner_tick_ms))
        .with_typewriter_delay(Duration::from_millis(config.ui.typewriter_delay_ms)))
}

pub(crate) fn session_defaults(config: &AppConfig) -> SessionConfig {
    SessionConfig {
        model: config.model.clone(),
        system_prompt: config.system_prompt.clone(),
        max_tokens: config.max_tokens,
        stream_mode: config.stream_mode,
    }
}
