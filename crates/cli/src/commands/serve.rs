//! `kokua serve` — Start the HTTP API server.

use kokua_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🌺 Kokua Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Database:  {}", config.database.url);
    if config.vertex.is_configured() {
        println!(
            "   Model:     {} ({})",
            config.vertex.model, config.vertex.location
        );
    } else {
        println!("   Model:     not configured — running with the fallback generator");
    }

    kokua_gateway::start(config).await?;

    Ok(())
}
