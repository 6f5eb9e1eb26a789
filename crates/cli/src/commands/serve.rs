//! `taconite serve` — Start the REST API server.

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;

    if let Some(port) = port_override {
        config.server.port = port;
    }

    println!("🤖 Taconite API");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Ollama:    {}", config.inference.host);
    println!("   Model:     {}", config.model);

    taconite_gateway::start(config).await?;

    Ok(())
}
