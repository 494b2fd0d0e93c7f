//! Mailgun provider (fallback).
//!
//! Sends a plain-text message through the messages API of the sending domain.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use herald_common::config::AppConfig;
use herald_common::error::AppError;

use super::{EmailProvider, OutgoingEmail, ProviderError, ensure_success, http_client};

/// Mailgun HTTP provider.
pub struct MailgunProvider {
    api_key: String,
    domain: String,
    base_url: String,
    client: Client,
}

impl MailgunProvider {
    pub fn new(
        api_key: String,
        domain: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            api_key,
            domain,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        match (&config.mailgun_api_key, &config.mailgun_domain) {
            (Some(key), Some(domain)) => Self::new(
                key.clone(),
                domain.clone(),
                config.mailgun_base_url.clone(),
                config.provider_timeout(),
            ),
            _ => Err(AppError::Config(
                "MAILGUN_SENDING_API_KEY and MAILGUN_DOMAIN must be set".to_string(),
            )),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v3/{}/messages", self.base_url, self.domain)
    }
}

#[async_trait]
impl EmailProvider for MailgunProvider {
    fn name(&self) -> &'static str {
        "Mailgun"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), ProviderError> {
        tracing::debug!(to = %email.to, from = %email.from, "Sending email via Mailgun");

        let form = [
            ("from", email.from.as_str()),
            ("to", email.to.as_str()),
            ("subject", email.subject.as_str()),
            ("text", email.body.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint())
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        tracing::debug!(status = response.status().as_u16(), "Mailgun response");
        ensure_success(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "ana@example.com".to_string(),
            from: "noreply@herald.test".to_string(),
            subject: "Hello".to_string(),
            body: "plain body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_form_to_domain() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/mg.herald.test/messages")
            // base64("api:mg-key")
            .match_header("authorization", "Basic YXBpOm1nLWtleQ==")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("to".into(), "ana@example.com".into()),
                Matcher::UrlEncoded("subject".into(), "Hello".into()),
                Matcher::UrlEncoded("text".into(), "plain body".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"message":"Queued. Thank you."}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = MailgunProvider::new(
            "mg-key".to_string(),
            "mg.herald.test".to_string(),
            server.url(),
            Duration::from_secs(5),
        )
        .unwrap();

        provider.send(&email()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v3/mg.herald.test/messages")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let provider = MailgunProvider::new(
            "mg-key".to_string(),
            "mg.herald.test".to_string(),
            server.url(),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = provider.send(&email()).await.unwrap_err();
        assert_eq!(err.to_string(), "unexpected status 503: unavailable");
    }

    #[test]
    fn test_domain_required() {
        let mut config = crate::test_support::config();
        config.mailgun_domain = None;
        assert!(matches!(
            MailgunProvider::from_config(&config),
            Err(AppError::Config(_))
        ));
    }
}
