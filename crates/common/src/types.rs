use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery channel an outbox item is routed through.
///
/// Only email is delivered today; the worker claims items for exactly one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

/// Lifecycle state of an outbox item.
///
/// `Sent` and `Dead` are terminal. `Failed` means "failed, retry scheduled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Claimed,
    Sent,
    Failed,
    Dead,
}

impl OutboxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Sent | OutboxStatus::Dead)
    }

    /// Whether an item in this status may be claimed once it is due.
    pub fn is_claimable(&self) -> bool {
        matches!(self, OutboxStatus::Pending | OutboxStatus::Failed)
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "pending"),
            OutboxStatus::Claimed => write!(f, "claimed"),
            OutboxStatus::Sent => write!(f, "sent"),
            OutboxStatus::Failed => write!(f, "failed"),
            OutboxStatus::Dead => write!(f, "dead"),
        }
    }
}

/// A row in the durable notification outbox.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxItem {
    pub id: Uuid,
    pub channel: String,
    pub recipient_email: Option<String>,
    /// Selects the render strategy; absent or unknown keys use the generic one.
    pub template_key: Option<String>,
    /// Template variables, normally a JSON object.
    pub payload: serde_json::Value,
    /// Number of failed delivery attempts so far.
    pub attempt_count: i32,
    pub status: OutboxStatus,
    /// Epoch seconds; the item is claimable once `now >= next_attempt_at`.
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
    /// When the current (or last) claim was taken; drives lease expiry.
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxItem {
    /// Build a fresh `pending` item from a producer request, due immediately.
    pub fn pending(new: NewOutboxItem, now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: new.channel.to_string(),
            recipient_email: new.recipient_email,
            template_key: new.template_key,
            payload: new.payload,
            attempt_count: 0,
            status: OutboxStatus::Pending,
            next_attempt_at: now,
            last_error: None,
            claimed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Mark the item claimed at `now` (epoch seconds).
    pub fn claim(&mut self, now: i64) {
        self.status = OutboxStatus::Claimed;
        self.claimed_at = DateTime::<Utc>::from_timestamp(now, 0);
    }

    /// A `claimed` item whose claim was taken strictly before `claimed_before`.
    pub fn is_stale_claim(&self, claimed_before: i64) -> bool {
        self.status == OutboxStatus::Claimed
            && self
                .claimed_at
                .is_some_and(|at| at.timestamp() < claimed_before)
    }

    /// The recipient, if present and not blank.
    pub fn recipient(&self) -> Option<&str> {
        self.recipient_email
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Producer request to enqueue a delivery intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutboxItem {
    pub channel: Channel,
    pub recipient_email: Option<String>,
    pub template_key: Option<String>,
    pub payload: serde_json::Value,
}

/// Current time as epoch seconds, the unit of `next_attempt_at`.
pub fn current_epoch() -> i64 {
    Utc::now().timestamp()
}
