//! Subcommand implementations.

pub mod diagnose;
pub mod migrate;
pub mod outbox;
pub mod staging;

use match_magnet_web::config::WebConfig;
use match_magnet_web::db;
use sqlx::PgPool;

/// Load the web configuration and connect to its database.
pub async fn connect() -> Result<(WebConfig, PgPool), Box<dyn std::error::Error>> {
    let config = WebConfig::from_env()?;
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    Ok((config, pool))
}
