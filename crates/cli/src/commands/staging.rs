//! Photo staging maintenance.

use std::time::Duration;

use match_magnet_web::config::WebConfig;
use match_magnet_web::services::PhotoStaging;

/// Remove staged photo drafts older than `older_than_hours`.
#[allow(clippy::print_stdout)]
pub async fn prune(older_than_hours: u64) -> Result<(), Box<dyn std::error::Error>> {
    let config = WebConfig::from_env()?;
    let staging = PhotoStaging::new(&config.staging_dir);

    let max_age = Duration::from_secs(older_than_hours.saturating_mul(60 * 60));
    let removed = staging.prune_older_than(max_age).await?;
    println!(
        "removed {removed} draft(s) older than {older_than_hours}h from {}",
        config.staging_dir.display()
    );
    Ok(())
}
