//! Database operations for the service's own `PostgreSQL`.
//!
//! Funnel records live in the hosted store. The local database only holds
//! what the service itself needs to be reliable:
//!
//! ## Tables
//!
//! - `tower_sessions.session` - Visitor sessions (funnel progress)
//! - `funnel.outbox` - Records waiting to be replayed into the hosted store
//!
//! # Migrations
//!
//! Migrations are stored in `crates/web/migrations/` and run via:
//! ```bash
//! cargo run -p match-magnet-cli -- migrate
//! ```

pub mod outbox;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use outbox::PgOutbox;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
