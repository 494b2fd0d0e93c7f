//! SendGrid provider (primary).
//!
//! Sends through the v3 mail send API with an HTML body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use herald_common::config::AppConfig;
use herald_common::error::AppError;

use super::{EmailProvider, OutgoingEmail, ProviderError, ensure_success, http_client};

#[derive(Debug, Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct SendGridPersonalization<'a> {
    to: Vec<SendGridAddress<'a>>,
}

#[derive(Debug, Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct SendGridRequest<'a> {
    personalizations: Vec<SendGridPersonalization<'a>>,
    from: SendGridAddress<'a>,
    subject: &'a str,
    content: Vec<SendGridContent<'a>>,
}

impl<'a> SendGridRequest<'a> {
    fn from_email(email: &'a OutgoingEmail) -> Self {
        Self {
            personalizations: vec![SendGridPersonalization {
                to: vec![SendGridAddress { email: &email.to }],
            }],
            from: SendGridAddress { email: &email.from },
            subject: &email.subject,
            content: vec![SendGridContent {
                content_type: "text/html",
                value: &email.body,
            }],
        }
    }
}

/// SendGrid HTTP provider.
pub struct SendGridProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl SendGridProvider {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let api_key = config.sendgrid_api_key.clone().ok_or_else(|| {
            AppError::Config("SENDGRID_API_KEY environment variable is not set".to_string())
        })?;
        Self::new(
            api_key,
            config.sendgrid_base_url.clone(),
            config.provider_timeout(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/v3/mail/send", self.base_url)
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn name(&self) -> &'static str {
        "SendGrid"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&SendGridRequest::from_email(email))
            .send()
            .await?;

        tracing::debug!(status = response.status().as_u16(), "SendGrid response");
        ensure_success(response).await
    }
}
