//! `taconite saved` — List conversations in the save directory.

use taconite_core::export::ConversationStore;
use taconite_store::FileStore;

use crate::render::TerminalRenderer;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = FileStore::new(&config.save_dir);
    let entries = store.list()?;

    if entries.is_empty() {
        println!("No saved conversations in {}", store.dir().display());
        return Ok(());
    }

    TerminalRenderer::stdout().saved_list(&entries);
    Ok(())
}
