//! Email delivery providers.
//!
//! Each provider wraps one transactional-email HTTP API behind the
//! [`EmailProvider`] trait. Providers are built once at startup from
//! [`AppConfig`] and shared by reference with the dispatcher.

pub mod mailgun;
pub mod sendgrid;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use herald_common::config::AppConfig;
use herald_common::error::AppError;

pub use mailgun::MailgunProvider;
pub use sendgrid::SendGridProvider;

/// A fully rendered message addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A transactional-email service that can deliver one message.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Short name used in logs and combined error messages.
    fn name(&self) -> &'static str;

    /// Deliver the message. Network and non-2xx failures come back as `Err`.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), ProviderError>;
}

/// Build the HTTP client shared by a provider, bounded by the per-call timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Turn a non-2xx response into a [`ProviderError::Status`].
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<(), ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Build the primary (SendGrid) and fallback (Mailgun) providers from config.
///
/// Missing credentials are configuration errors and stop startup.
pub fn providers_from_config(
    config: &AppConfig,
) -> Result<(Arc<dyn EmailProvider>, Arc<dyn EmailProvider>), AppError> {
    let primary = SendGridProvider::from_config(config)?;
    let fallback = MailgunProvider::from_config(config)?;
    Ok((Arc::new(primary), Arc::new(fallback)))
}
