//! Outbox maintenance commands.
//!
//! Rows that reached the retry limit stay in `funnel.outbox` until an
//! operator looks at them; `status` lists them with their last error.

use match_magnet_web::db::outbox::PgOutbox;
use match_magnet_web::hosted_store;
use match_magnet_web::services::Outbox;
use match_magnet_web::services::outbox::drain_once;

use super::connect;

/// Print outbox counts and the newest stuck rows.
#[allow(clippy::print_stdout)]
pub async fn status(limit: i64) -> Result<(), Box<dyn std::error::Error>> {
    let (_, pool) = connect().await?;
    let outbox = PgOutbox::new(pool);

    let stats = outbox.stats().await?;
    println!("pending:   {}", stats.pending);
    println!("stuck:     {}", stats.stuck);
    println!("delivered: {}", stats.delivered);

    let stuck = outbox.stuck(limit).await?;
    if !stuck.is_empty() {
        println!();
        println!("Stuck rows (newest first):");
    }
    for entry in stuck {
        println!(
            "  #{} {} attempts={} created={} error={}",
            entry.id,
            entry.target_table,
            entry.attempts,
            entry.created_at.to_rfc3339(),
            entry.last_error.as_deref().unwrap_or("-"),
        );
        println!("    {}", serde_json::to_string(&entry.payload)?);
    }
    Ok(())
}

/// Replay up to `limit` pending rows into the hosted store.
#[allow(clippy::print_stdout)]
pub async fn drain(limit: i64) -> Result<(), Box<dyn std::error::Error>> {
    let (config, pool) = connect().await?;
    let outbox = PgOutbox::new(pool);
    let store = hosted_store::from_config(config.supabase.as_ref())?;

    let report = drain_once(&outbox, store.as_ref(), limit).await?;
    println!("delivered: {}, failed: {}", report.delivered, report.failed);
    Ok(())
}
