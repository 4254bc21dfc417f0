//! `PostgreSQL` storage for the funnel outbox (`funnel.outbox`).

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::services::outbox::{MAX_ATTEMPTS, Outbox, OutboxEntry, OutboxError, OutboxStats};

/// How long a claimed row stays hidden from other drainers.
const CLAIM_SECONDS: i32 = 300;

/// Outbox backed by the local database.
#[derive(Clone)]
pub struct PgOutbox {
    pool: PgPool,
}

impl PgOutbox {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Outbox for PgOutbox {
    async fn enqueue(&self, target_table: &str, payload: &Value) -> Result<i64, OutboxError> {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO funnel.outbox (target_table, payload)
            VALUES ($1, $2)
            RETURNING id
            ",
        )
        .bind(target_table)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn claim_pending(&self, limit: i64) -> Result<Vec<OutboxEntry>, OutboxError> {
        let mut entries = sqlx::query_as::<_, OutboxEntry>(
            r"
            UPDATE funnel.outbox
            SET locked_until = now() + $3 * interval '1 second'
            WHERE id IN (
                SELECT id FROM funnel.outbox
                WHERE delivered_at IS NULL
                  AND attempts < $1
                  AND (locked_until IS NULL OR locked_until < now())
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, target_table, payload, attempts, last_error, created_at
            ",
        )
        .bind(MAX_ATTEMPTS)
        .bind(limit)
        .bind(f64::from(CLAIM_SECONDS))
        .fetch_all(&self.pool)
        .await?;

        // RETURNING does not preserve the subquery order.
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    async fn mark_delivered(&self, id: i64) -> Result<(), OutboxError> {
        sqlx::query(
            r"
            UPDATE funnel.outbox
            SET delivered_at = now(), locked_until = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        permanent: bool,
    ) -> Result<(), OutboxError> {
        sqlx::query(
            r"
            UPDATE funnel.outbox
            SET attempts = CASE WHEN $3 THEN GREATEST(attempts + 1, $4) ELSE attempts + 1 END,
                last_error = $2,
                locked_until = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .bind(permanent)
        .bind(MAX_ATTEMPTS)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats, OutboxError> {
        let (pending, stuck, delivered): (i64, i64, i64) = sqlx::query_as(
            r"
            SELECT
                count(*) FILTER (WHERE delivered_at IS NULL AND attempts < $1),
                count(*) FILTER (WHERE delivered_at IS NULL AND attempts >= $1),
                count(*) FILTER (WHERE delivered_at IS NOT NULL)
            FROM funnel.outbox
            ",
        )
        .bind(MAX_ATTEMPTS)
        .fetch_one(&self.pool)
        .await?;

        Ok(OutboxStats {
            pending,
            stuck,
            delivered,
        })
    }

    async fn stuck(&self, limit: i64) -> Result<Vec<OutboxEntry>, OutboxError> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r"
            SELECT id, target_table, payload, attempts, last_error, created_at
            FROM funnel.outbox
            WHERE delivered_at IS NULL AND attempts >= $1
            ORDER BY id DESC
            LIMIT $2
            ",
        )
        .bind(MAX_ATTEMPTS)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
