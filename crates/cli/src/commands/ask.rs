//! `taconite ask` — Ask one question on a fresh session, then exit.

use std::sync::Arc;

use taconite_chat::ReplyMode;

use super::{build_assembler, load_config, seed_registry};
use crate::render::TerminalRenderer;

pub async fn run(message: String, batch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let renderer = Arc::new(TerminalRenderer::stdout());
    let assembler = build_assembler(&config, renderer.clone())?;
    let mut registry = seed_registry(&config, renderer.clone());

    let mode = if batch {
        ReplyMode::Batch
    } else {
        ReplyMode::from_stream_flag(config.stream_mode)
    };

    if mode.is_stream() {
        renderer.assistant_prefix();
    }
    let result = assembler
        .respond(registry.current_mut(), &message, mode)
        .await;

    match result {
        Ok(_) if mode.is_stream() => renderer.end_stream(),
        Ok(reply) => renderer.reply(&reply),
        Err(e) => {
            if mode.is_stream() {
                renderer.end_stream();
            }
            renderer.gateway_error(&e);
            return Err(e.into());
        }
    }

    Ok(())
}
