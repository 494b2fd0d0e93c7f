//! PostgreSQL outbox store.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` inside a single statement so
//! concurrent workers (other replicas) never receive the same row.
//! `claimed_at` is written from the caller's clock, the same one the lease
//! cutoff is computed from.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{NewOutboxItem, OutboxItem, OutboxStatus, current_epoch};

use super::{DEFAULT_CLAIM_LEASE, OutboxStore, lease_cutoff};

#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
    claim_lease: Duration,
}

#[derive(sqlx::FromRow)]
struct ClaimedRow {
    #[sqlx(flatten)]
    item: OutboxItem,
    /// The row was taken over from an expired claim.
    reclaimed: bool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a new `pending` item, due immediately.
    pub async fn enqueue(&self, new: NewOutboxItem) -> Result<OutboxItem, AppError> {
        let item = OutboxItem::pending(new, current_epoch());

        let stored: OutboxItem = sqlx::query_as(
            r#"
            INSERT INTO notification_outbox
                (id, channel, recipient_email, template_key, payload, attempt_count, status, next_attempt_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
            RETURNING id, channel, recipient_email, template_key, payload, attempt_count,
                      status, next_attempt_at, last_error, claimed_at, created_at
            "#,
        )
        .bind(item.id)
        .bind(&item.channel)
        .bind(&item.recipient_email)
        .bind(&item.template_key)
        .bind(&item.payload)
        .bind(OutboxStatus::Pending.to_string())
        .bind(item.next_attempt_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            id = %stored.id,
            channel = %stored.channel,
            template_key = stored.template_key.as_deref().unwrap_or("generic"),
            "Outbox item enqueued"
        );

        Ok(stored)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<OutboxItem>, AppError> {
        let item = sqlx::query_as(
            r#"
            SELECT id, channel, recipient_email, template_key, payload, attempt_count,
                   status, next_attempt_at, last_error, claimed_at, created_at
            FROM notification_outbox
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }
}

/// `mark_*` updates are guarded by `status = 'claimed'`; zero rows means the
/// item was already terminal or never claimed.
fn warn_if_unclaimed(id: Uuid, rows_affected: u64) {
    if rows_affected == 0 {
        tracing::warn!(id = %id, "Outbox item was not in claimed state; update skipped");
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn claim_batch(
        &self,
        channel: &str,
        limit: u32,
        now: i64,
    ) -> Result<Vec<OutboxItem>, AppError> {
        let rows: Vec<ClaimedRow> = sqlx::query_as(
            r#"
            WITH due AS (
                SELECT id, status = 'claimed' AS reclaimed
                FROM notification_outbox
                WHERE channel = $1
                  AND (
                        (status IN ('pending', 'failed') AND next_attempt_at <= $2)
                     OR (status = 'claimed' AND claimed_at < to_timestamp($4::double precision))
                  )
                ORDER BY next_attempt_at ASC, created_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE notification_outbox o
            SET status = 'claimed',
                claimed_at = to_timestamp($2::double precision),
                updated_at = NOW()
            FROM due
            WHERE o.id = due.id
            RETURNING o.id, o.channel, o.recipient_email, o.template_key, o.payload,
                      o.attempt_count, o.status, o.next_attempt_at, o.last_error,
                      o.claimed_at, o.created_at, due.reclaimed
            "#,
        )
        .bind(channel)
        .bind(now)
        .bind(i64::from(limit))
        .bind(lease_cutoff(now, self.claim_lease))
        .fetch_all(&self.pool)
        .await?;

        let mut items: Vec<OutboxItem> = rows
            .into_iter()
            .map(|row| {
                if row.reclaimed {
                    tracing::warn!(
                        id = %row.item.id,
                        attempt_count = row.item.attempt_count,
                        "Reclaiming outbox item after its claim lease expired"
                    );
                }
                row.item
            })
            .collect();

        // RETURNING does not preserve the CTE order
        items.sort_by(|a, b| {
            (a.next_attempt_at, a.created_at).cmp(&(b.next_attempt_at, b.created_at))
        });

        Ok(items)
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'sent', sent_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'claimed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        warn_if_unclaimed(id, result.rows_affected());
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        next_attempt_at: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'failed',
                attempt_count = attempt_count + 1,
                last_error = $2,
                next_attempt_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'claimed'
            "#,
        )
        .bind(id)
        .bind(error_message)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;

        warn_if_unclaimed(id, result.rows_affected());
        Ok(())
    }

    async fn mark_dead(&self, id: Uuid, error_message: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'dead',
                attempt_count = attempt_count + 1,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'claimed'
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        warn_if_unclaimed(id, result.rows_affected());
        Ok(())
    }
}
