//! Durable outbox for funnel records the hosted store could not take.
//!
//! When a funnel write fails with a transient error the row is parked in
//! the local `funnel.outbox` table instead of being lost. A background task
//! replays pending rows oldest first until the store accepts them. Rows that
//! reach [`MAX_ATTEMPTS`], or that the store rejects outright, stop being
//! retried and show up in `mm-cli outbox status`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::hosted_store::{HostedStore, IMAGES_TABLE, ONBOARDING_TABLE, PAYMENTS_TABLE};

/// Deliveries attempted before a row is left for an operator.
pub const MAX_ATTEMPTS: i32 = 20;

/// Rows claimed per drain pass.
pub const DRAIN_BATCH: i64 = 50;

/// Errors from the outbox storage.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown target table: {0}")]
    UnknownTable(String),
}

/// A parked row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: i64,
    pub target_table: String,
    pub payload: Value,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row counts by delivery state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    /// Waiting for the next drain.
    pub pending: i64,
    /// No longer retried.
    pub stuck: i64,
    pub delivered: i64,
}

/// Storage for parked rows.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Park a row for later delivery to `target_table`.
    async fn enqueue(&self, target_table: &str, payload: &Value) -> Result<i64, OutboxError>;

    /// Claim up to `limit` deliverable rows, oldest first.
    ///
    /// Claimed rows are hidden from other drainers for a few minutes.
    async fn claim_pending(&self, limit: i64) -> Result<Vec<OutboxEntry>, OutboxError>;

    async fn mark_delivered(&self, id: i64) -> Result<(), OutboxError>;

    /// Record a failed delivery. `permanent` stops further retries.
    async fn mark_failed(&self, id: i64, error: &str, permanent: bool)
    -> Result<(), OutboxError>;

    async fn stats(&self) -> Result<OutboxStats, OutboxError>;

    /// Rows that are no longer retried, newest first.
    async fn stuck(&self, limit: i64) -> Result<Vec<OutboxEntry>, OutboxError>;
}

/// Check that a row targets one of the funnel tables.
///
/// # Errors
///
/// Returns `OutboxError::UnknownTable` otherwise.
pub fn check_table(target_table: &str) -> Result<(), OutboxError> {
    if [PAYMENTS_TABLE, ONBOARDING_TABLE, IMAGES_TABLE].contains(&target_table) {
        Ok(())
    } else {
        Err(OutboxError::UnknownTable(target_table.to_string()))
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Replay one batch of pending rows into the hosted store.
///
/// # Errors
///
/// Returns an error only when the outbox itself cannot be read or updated.
#[instrument(skip_all)]
pub async fn drain_once(
    outbox: &dyn Outbox,
    store: &dyn HostedStore,
    limit: i64,
) -> Result<DrainReport, OutboxError> {
    let entries = outbox.claim_pending(limit).await?;
    let mut report = DrainReport::default();

    for entry in entries {
        if let Err(e) = check_table(&entry.target_table) {
            outbox.mark_failed(entry.id, &e.to_string(), true).await?;
            report.failed += 1;
            continue;
        }

        match store.insert(&entry.target_table, entry.payload).await {
            Ok(_) => {
                outbox.mark_delivered(entry.id).await?;
                report.delivered += 1;
                debug!(id = entry.id, table = %entry.target_table, "Outbox row delivered");
            }
            Err(e) => {
                let permanent = !e.is_transient();
                warn!(
                    id = entry.id,
                    table = %entry.target_table,
                    attempts = entry.attempts + 1,
                    permanent,
                    error = %e,
                    "Outbox delivery failed"
                );
                outbox.mark_failed(entry.id, &e.to_string(), permanent).await?;
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Drain the outbox every `interval` until the process exits.
pub fn spawn_drainer(
    outbox: Arc<dyn Outbox>,
    store: Arc<dyn HostedStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match drain_once(outbox.as_ref(), store.as_ref(), DRAIN_BATCH).await {
                Ok(report) if report.delivered + report.failed > 0 => {
                    info!(
                        delivered = report.delivered,
                        failed = report.failed,
                        "Outbox drain pass"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Outbox drain failed"),
            }
        }
    })
}
