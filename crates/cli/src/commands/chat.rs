//! `taconite chat` — Interactive chat loop (default command).

use std::sync::Arc;

use taconite_store::FileStore;
use tracing::warn;

use super::{build_assembler, load_config, seed_registry, session_defaults};
use crate::input::stdin_lines;
use crate::render::TerminalRenderer;
use crate::repl::ChatSession;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let renderer = Arc::new(TerminalRenderer::stdout());
    let assembler = build_assembler(&config, renderer.clone())?;

    // The loop still starts when the server is down; each turn reports the failure.
    match assembler.gateway().health_check().await {
        Ok(true) => {}
        Ok(false) => warn!(host = %config.inference.host, "Ollama responded but is not healthy"),
        Err(e) => {
            warn!(host = %config.inference.host, error = %e, "Ollama is not reachable");
            renderer.gateway_error(&e);
        }
    }

    let store = Arc::new(FileStore::new(&config.save_dir));
    let mut session = ChatSession::new(
        seed_registry(&config, renderer.clone()),
        assembler,
        store,
        renderer,
        session_defaults(&config),
    );

    session.run(stdin_lines()).await?;
    Ok(())
}
