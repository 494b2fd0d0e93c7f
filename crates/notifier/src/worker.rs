//! Outbox worker that drains the notification outbox.
//!
//! One cycle claims a batch for the worker's channel, renders and dispatches
//! each item in turn, and records the outcome (sent, retry scheduled, or
//! dead-lettered). The loop sleeps a fixed interval between cycles and only
//! observes cancellation there, so an in-flight item always finishes.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use herald_common::config::AppConfig;
use herald_common::error::AppError;
use herald_common::types::{Channel, OutboxItem, current_epoch};

use crate::dispatcher::FallbackDispatcher;
use crate::provider::OutgoingEmail;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::OutboxStore;
use crate::template;

/// Items claimed per poll cycle.
pub const CLAIM_LIMIT: u32 = 25;

/// Fixed delay between cycles.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub channel: Channel,
    /// Sender used unless an item's payload carries `from_email`.
    pub from_address: String,
    pub claim_limit: u32,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl WorkerConfig {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            channel: Channel::Email,
            from_address: from_address.into(),
            claim_limit: CLAIM_LIMIT,
            poll_interval: POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, AppError> {
        let from = config.email_from.clone().ok_or_else(|| {
            AppError::Config("EMAIL_FROM environment variable is not set".to_string())
        })?;

        Ok(Self {
            claim_limit: config.outbox_claim_limit,
            poll_interval: config.outbox_poll_interval(),
            ..Self::new(from)
        })
    }
}

/// How a single item left the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Sent,
    Retrying { attempt: i32, next_attempt_at: i64 },
    Dead { attempt: i32 },
}

/// Per-cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub claimed: usize,
    pub sent: usize,
    pub retried: usize,
    pub dead: usize,
    /// Items whose outcome could not be persisted.
    pub store_errors: usize,
}

impl CycleStats {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Sent => self.sent += 1,
            ItemOutcome::Retrying { .. } => self.retried += 1,
            ItemOutcome::Dead { .. } => self.dead += 1,
        }
    }
}

pub struct OutboxWorker<S> {
    store: Arc<S>,
    dispatcher: FallbackDispatcher,
    config: WorkerConfig,
}

impl<S: OutboxStore> OutboxWorker<S> {
    pub fn new(store: Arc<S>, dispatcher: FallbackDispatcher, config: WorkerConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Run cycles until `cancel` fires. Cycle errors are logged, never fatal.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            channel = %self.config.channel,
            claim_limit = self.config.claim_limit,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Outbox worker started"
        );

        while !cancel.is_cancelled() {
            match self.process_once().await {
                Ok(stats) if stats.claimed > 0 => {
                    tracing::info!(
                        claimed = stats.claimed,
                        sent = stats.sent,
                        retried = stats.retried,
                        dead = stats.dead,
                        store_errors = stats.store_errors,
                        "Outbox cycle finished"
                    );
                }
                Ok(_) => tracing::debug!("Outbox cycle found no due items"),
                Err(e) => tracing::error!(error = %e, "Outbox worker cycle failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(channel = %self.config.channel, "Outbox worker stopped");
    }

    /// Claim one batch and process every item in it.
    ///
    /// Only a failed claim is returned as an error; per-item failures are
    /// recorded on the item and counted in the stats. An item whose outcome
    /// cannot be written stays `claimed` until its lease expires.
    pub async fn process_once(&self) -> Result<CycleStats, AppError> {
        let batch = self
            .store
            .claim_batch(
                self.config.channel.as_str(),
                self.config.claim_limit,
                current_epoch(),
            )
            .await?;

        let mut stats = CycleStats {
            claimed: batch.len(),
            ..CycleStats::default()
        };

        for item in &batch {
            match self.process_item(item).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    stats.store_errors += 1;
                    tracing::error!(
                        id = %item.id,
                        error = %e,
                        "Failed to record outbox item outcome"
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Deliver one claimed item and persist its new state.
    pub async fn process_item(&self, item: &OutboxItem) -> Result<ItemOutcome, AppError> {
        let error = match self.deliver(item).await {
            Ok(provider) => {
                self.store.mark_sent(item.id).await?;
                tracing::info!(id = %item.id, provider, "Outbox item sent");
                return Ok(ItemOutcome::Sent);
            }
            Err(error) => error,
        };

        match self.config.retry.on_failure(item.attempt_count) {
            RetryDecision::Retry { attempt, delay } => {
                let next_attempt_at = current_epoch() + delay.as_secs() as i64;
                self.store
                    .mark_failed(item.id, &error, next_attempt_at)
                    .await?;
                tracing::warn!(
                    id = %item.id,
                    attempt,
                    retry_in_secs = delay.as_secs(),
                    error = %error,
                    "Outbox item delivery failed, retry scheduled"
                );
                Ok(ItemOutcome::Retrying {
                    attempt,
                    next_attempt_at,
                })
            }
            RetryDecision::Dead { attempt } => {
                self.store.mark_dead(item.id, &error).await?;
                tracing::error!(
                    id = %item.id,
                    attempt,
                    error = %error,
                    "Outbox item moved to dead after exhausting retries"
                );
                Ok(ItemOutcome::Dead { attempt })
            }
        }
    }

    /// Render and dispatch; a missing recipient fails like any other attempt.
    async fn deliver(&self, item: &OutboxItem) -> Result<&'static str, String> {
        let to = item
            .recipient()
            .ok_or_else(|| "Outbox item missing recipient_email".to_string())?;

        let rendered = template::render(item.template_key.as_deref(), &item.payload);
        let from = item
            .payload
            .get("from_email")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|from| !from.is_empty())
            .map_or_else(|| self.config.from_address.clone(), str::to_string);

        let email = OutgoingEmail {
            to: to.to_string(),
            from,
            subject: rendered.subject,
            body: rendered.body,
        };

        self.dispatcher
            .dispatch(&email)
            .await
            .map_err(|e| e.to_string())
    }
}
