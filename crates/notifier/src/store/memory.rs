//! In-memory outbox store.
//!
//! A single mutex guards all rows, so a claim selects and marks items in
//! one critical section. Useful for tests and local runs without Postgres.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{OutboxItem, OutboxStatus};

use super::{DEFAULT_CLAIM_LEASE, OutboxStore, lease_cutoff};

pub struct InMemoryOutboxStore {
    items: Mutex<Vec<OutboxItem>>,
    claim_lease: Duration,
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn insert(&self, item: OutboxItem) -> Result<(), AppError> {
        self.lock()?.push(item);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<OutboxItem> {
        self.items
            .lock()
            .ok()?
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Snapshot of every stored item, in insertion order.
    pub fn items(&self) -> Vec<OutboxItem> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<OutboxItem>>, AppError> {
        self.items
            .lock()
            .map_err(|_| AppError::Internal("outbox store lock poisoned".to_string()))
    }

    /// Apply `update` to the item if it is currently claimed.
    fn update_claimed(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut OutboxItem),
    ) -> Result<(), AppError> {
        let mut items = self.lock()?;
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Outbox item {} not found", id)))?;

        if item.status == OutboxStatus::Claimed {
            update(item);
        } else {
            tracing::warn!(
                id = %id,
                status = %item.status,
                "Outbox item was not in claimed state; update skipped"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn claim_batch(
        &self,
        channel: &str,
        limit: u32,
        now: i64,
    ) -> Result<Vec<OutboxItem>, AppError> {
        let stale_before = lease_cutoff(now, self.claim_lease);
        let mut items = self.lock()?;

        let mut due: Vec<&mut OutboxItem> = items
            .iter_mut()
            .filter(|item| {
                item.channel == channel
                    && ((item.status.is_claimable() && item.next_attempt_at <= now)
                        || item.is_stale_claim(stale_before))
            })
            .collect();
        due.sort_by(|a, b| {
            (a.next_attempt_at, a.created_at).cmp(&(b.next_attempt_at, b.created_at))
        });

        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(|item| {
                if item.status == OutboxStatus::Claimed {
                    tracing::warn!(
                        id = %item.id,
                        "Reclaiming outbox item after its claim lease expired"
                    );
                }
                item.claim(now);
                item.clone()
            })
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), AppError> {
        self.update_claimed(id, |item| item.status = OutboxStatus::Sent)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        next_attempt_at: i64,
    ) -> Result<(), AppError> {
        self.update_claimed(id, |item| {
            item.status = OutboxStatus::Failed;
            item.attempt_count += 1;
            item.last_error = Some(error_message.to_string());
            item.next_attempt_at = next_attempt_at;
        })
    }

    async fn mark_dead(&self, id: Uuid, error_message: &str) -> Result<(), AppError> {
        self.update_claimed(id, |item| {
            item.status = OutboxStatus::Dead;
            item.attempt_count += 1;
            item.last_error = Some(error_message.to_string());
        })
    }
}
