//! Outbox store contract consumed by the worker.
//!
//! Implementations must make `claim_batch` atomic: an item handed to one
//! claimer is in `claimed` state before any other claimer can see it.
//! The `mark_*` operations only apply to items currently `claimed`, which
//! keeps `sent` and `dead` rows immutable.
//!
//! A claim is a lease. An item still `claimed` once the lease has run out
//! (its worker crashed or could not record the outcome) becomes claimable
//! again, so no item is stranded. The lease must outlast a whole batch.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::OutboxItem;

pub use memory::InMemoryOutboxStore;
pub use postgres::PgOutboxStore;

/// How long a claim holds before the item may be claimed again.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(900);

/// Epoch second before which a claim counts as expired.
pub(crate) fn lease_cutoff(now: i64, lease: Duration) -> i64 {
    now.saturating_sub(i64::try_from(lease.as_secs()).unwrap_or(i64::MAX))
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Atomically claim up to `limit` items of `channel` that are due at `now`
    /// (epoch seconds), ordered by due time. Items whose claim lease expired
    /// are eligible too.
    async fn claim_batch(
        &self,
        channel: &str,
        limit: u32,
        now: i64,
    ) -> Result<Vec<OutboxItem>, AppError>;

    async fn mark_sent(&self, id: Uuid) -> Result<(), AppError>;

    /// Record a failed attempt and schedule the next one.
    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        next_attempt_at: i64,
    ) -> Result<(), AppError>;

    /// Record the final failed attempt; the item is never retried again.
    async fn mark_dead(&self, id: Uuid, error_message: &str) -> Result<(), AppError>;
}
