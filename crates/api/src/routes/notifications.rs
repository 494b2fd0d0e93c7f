//! Notification enqueue and status routes.
//!
//! Handlers only write to the outbox; delivery happens asynchronously in the
//! outbox worker, so a `202` means "accepted", never "sent".

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{Channel, NewOutboxItem, OutboxItem, OutboxStatus};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notification", post(send_notification))
        .route("/api/notification/outbox", post(enqueue_outbox_item))
        .route("/api/notification/outbox/{id}", get(outbox_item_status))
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub to_email: String,
    pub from_email: String,
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub channel: Option<String>,
    pub recipient_email: Option<String>,
    pub template_key: Option<String>,
    pub payload: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub id: Uuid,
    pub status: OutboxStatus,
}

impl From<&OutboxItem> for Accepted {
    fn from(item: &OutboxItem) -> Self {
        Self {
            id: item.id,
            status: item.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutboxItemStatus {
    pub id: Uuid,
    pub channel: String,
    pub status: OutboxStatus,
    pub attempt_count: i32,
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<OutboxItem> for OutboxItemStatus {
    fn from(item: OutboxItem) -> Self {
        Self {
            id: item.id,
            channel: item.channel,
            status: item.status,
            attempt_count: item.attempt_count,
            next_attempt_at: item.next_attempt_at,
            last_error: item.last_error,
            created_at: item.created_at,
        }
    }
}

/// POST /api/notification queues a plain email rendered with the generic template.
async fn send_notification(
    State(state): State<AppState>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<Accepted>), AppError> {
    validate_address("to_email", &req.to_email)?;
    validate_address("from_email", &req.from_email)?;

    let item = state
        .outbox
        .enqueue(NewOutboxItem {
            channel: Channel::Email,
            recipient_email: Some(req.to_email.trim().to_string()),
            template_key: None,
            payload: json!({
                "subject": req.subject,
                "content": req.content,
                "from_email": req.from_email.trim(),
            }),
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(Accepted::from(&item))))
}

/// POST /api/notification/outbox enqueues a raw outbox item.
///
/// The recipient is stored as given; a missing one surfaces later through
/// the retry and dead-letter path rather than here.
async fn enqueue_outbox_item(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<Accepted>), AppError> {
    let channel = match req.channel.as_deref() {
        None => Channel::Email,
        Some(raw) => raw.parse::<Channel>().map_err(AppError::Validation)?,
    };

    let item = state
        .outbox
        .enqueue(NewOutboxItem {
            channel,
            recipient_email: req.recipient_email,
            template_key: req.template_key,
            payload: req.payload.unwrap_or_else(|| json!({})),
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(Accepted::from(&item))))
}

/// GET /api/notification/outbox/{id} returns the delivery state of one item.
async fn outbox_item_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboxItemStatus>, AppError> {
    let item = state
        .outbox
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Outbox item {} not found", id)))?;

    Ok(Json(item.into()))
}

fn validate_address(field: &str, value: &str) -> Result<(), AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if !value.contains('@') {
        return Err(AppError::Validation(format!(
            "{} is not a valid email address",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("to_email", "ana@example.com").is_ok());
        assert!(validate_address("to_email", "  ana@example.com ").is_ok());

        let err = validate_address("to_email", "   ").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: to_email is required");

        let err = validate_address("from_email", "not-an-address").unwrap_err();
        assert!(err.to_string().contains("from_email is not a valid email address"));
    }

    #[test]
    fn test_status_view_hides_payload() {
        let item = OutboxItem::pending(
            NewOutboxItem {
                channel: Channel::Email,
                recipient_email: Some("ana@example.com".to_string()),
                template_key: None,
                payload: json!({"secret": "token"}),
            },
            42,
        );

        let view = serde_json::to_value(OutboxItemStatus::from(item)).unwrap();

        assert_eq!(view["status"], "pending");
        assert_eq!(view["attempt_count"], 0);
        assert_eq!(view["next_attempt_at"], 42);
        assert!(view.get("payload").is_none());
    }
}
