use anyhow::Result;
use log::{error, info};
use std::sync::Arc;

use groupguard::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting Group Guard v{}", env!("CARGO_PKG_VERSION"));

    let config_path =
        std::env::var("GUARD_CONFIG").unwrap_or_else(|_| "guard.yaml".to_string());
    let config = GuardConfig::load(&config_path).await?;

    if config.admin_ids.is_empty() {
        error!("No admin ids configured; the /panel command will be unusable");
    }

    let telegram_config = TelegramConfig::from_env()?;
    let mut connection = TelegramConnection::new(telegram_config);
    connection.connect().await?;

    let events = connection
        .event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Telegram connection produced no event stream"))?;

    let bot = GuardBot::new(&config, Arc::new(connection));

    info!("Bot is running...");
    bot.run(events).await;

    info!("Event stream ended, shutting down");
    Ok(())
}
