//! Shared fakes for unit tests.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use herald_common::config::AppConfig;
use herald_common::error::AppError;
use herald_common::types::{Channel, NewOutboxItem, OutboxItem};

use crate::provider::{EmailProvider, OutgoingEmail, ProviderError};
use crate::store::{InMemoryOutboxStore, OutboxStore};

enum Behavior {
    Succeed,
    FailWithStatus(u16),
    Hang,
}

/// Provider double that counts calls and remembers the last message.
pub struct FakeProvider {
    name: &'static str,
    behavior: Behavior,
    calls: AtomicUsize,
    last: Mutex<Option<OutgoingEmail>>,
}

impl FakeProvider {
    fn with(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn ok(name: &'static str) -> Arc<Self> {
        Self::with(name, Behavior::Succeed)
    }

    pub fn failing(name: &'static str, status: u16) -> Arc<Self> {
        Self::with(name, Behavior::FailWithStatus(status))
    }

    pub fn hanging(name: &'static str) -> Arc<Self> {
        Self::with(name, Behavior::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_email(&self) -> Option<OutgoingEmail> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailProvider for FakeProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(email.clone());

        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::FailWithStatus(status) => Err(ProviderError::Status {
                status,
                body: format!("{} unavailable", self.name),
            }),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// In-memory store that fails the next `claim_failures` claims and the next
/// `write_failures` outcome writes, then behaves normally.
pub struct FlakyStore {
    pub inner: InMemoryOutboxStore,
    claim_failures: AtomicUsize,
    write_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryOutboxStore, claim_failures: usize, write_failures: usize) -> Self {
        Self {
            inner,
            claim_failures: AtomicUsize::new(claim_failures),
            write_failures: AtomicUsize::new(write_failures),
        }
    }

    fn trip(counter: &AtomicUsize, what: &str) -> Result<(), AppError> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(AppError::Internal(format!("injected {} failure", what))),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl OutboxStore for FlakyStore {
    async fn claim_batch(
        &self,
        channel: &str,
        limit: u32,
        now: i64,
    ) -> Result<Vec<OutboxItem>, AppError> {
        Self::trip(&self.claim_failures, "claim")?;
        self.inner.claim_batch(channel, limit, now).await
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), AppError> {
        Self::trip(&self.write_failures, "mark_sent")?;
        self.inner.mark_sent(id).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        next_attempt_at: i64,
    ) -> Result<(), AppError> {
        Self::trip(&self.write_failures, "mark_failed")?;
        self.inner.mark_failed(id, error_message, next_attempt_at).await
    }

    async fn mark_dead(&self, id: Uuid, error_message: &str) -> Result<(), AppError> {
        Self::trip(&self.write_failures, "mark_dead")?;
        self.inner.mark_dead(id, error_message).await
    }
}

pub fn email() -> OutgoingEmail {
    OutgoingEmail {
        to: "ana@example.com".to_string(),
        from: "noreply@herald.test".to_string(),
        subject: "Hello".to_string(),
        body: "Body".to_string(),
    }
}

/// A pending email item due at `next_attempt_at`.
pub fn item(recipient: &str, next_attempt_at: i64) -> OutboxItem {
    OutboxItem::pending(
        NewOutboxItem {
            channel: Channel::Email,
            recipient_email: Some(recipient.to_string()),
            template_key: None,
            payload: serde_json::json!({"subject": "Hello", "content": "Body"}),
        },
        next_attempt_at,
    )
}

pub fn config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        db_max_connections: 5,
        api_bind_addr: "127.0.0.1:0".to_string(),
        email_from: Some("noreply@herald.test".to_string()),
        sendgrid_api_key: Some("sg-key".to_string()),
        sendgrid_base_url: "http://127.0.0.1:1".to_string(),
        mailgun_api_key: Some("mg-key".to_string()),
        mailgun_domain: Some("mg.herald.test".to_string()),
        mailgun_base_url: "http://127.0.0.1:1".to_string(),
        provider_timeout_secs: 10,
        outbox_poll_interval_ms: 1500,
        outbox_claim_limit: 25,
        outbox_claim_lease_secs: 900,
        outbox_worker_enabled: true,
    }
}
