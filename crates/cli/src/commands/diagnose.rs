//! Hosted store connectivity check, the same round trip as
//! `GET /api/test-supabase`.

use match_magnet_web::config::WebConfig;
use match_magnet_web::hosted_store;
use match_magnet_web::services::diagnostics::store_round_trip;

/// Probe, insert and delete a test payment.
#[allow(clippy::print_stdout)]
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = WebConfig::from_env()?;
    let store = hosted_store::from_config(config.supabase.as_ref())?;

    let payment_id = store_round_trip(store.as_ref()).await?;
    println!("Hosted store OK (test payment {payment_id} inserted and deleted)");
    Ok(())
}
