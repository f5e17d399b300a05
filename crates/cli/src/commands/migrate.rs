//! `kokua migrate` — Create or update the chat history database schema.

use kokua_config::AppConfig;
use kokua_history::SqliteHistory;

pub async fn run(database_url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(url) = database_url {
        config.database.url = url;
    }

    println!("🔄 Migrating chat history database...");
    println!("   Database: {}", config.database.url);

    // Opening the backend runs all pending migrations.
    SqliteHistory::new(&config.database.url)
        .await
        .map_err(|e| format!("Migration failed: {e}"))?;

    println!("✅ Schema is up to date.");

    Ok(())
}
