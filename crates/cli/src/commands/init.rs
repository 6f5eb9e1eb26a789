//! `taconite init` — Write a starter config file.

use taconite_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = AppConfig::config_path();

    println!("🤖 Taconite — First-Time Setup");
    println!("==============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  Config file exists, leaving it alone: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config file: {}", config_path.display());
    }

    println!();
    println!("Next steps:");
    println!("  1. Start Ollama:        ollama serve");
    println!("  2. Pull the model:      ollama pull {}", AppConfig::default().model);
    println!("  3. Start chatting:      taconite");

    Ok(())
}
