//! Fallback dispatcher: primary provider first, secondary on failure.
//!
//! Provider failures are values, never panics: each call is bounded by a
//! timeout and its error is inspected to pick the next branch. When both
//! providers fail the caller gets one error carrying both reasons.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::provider::{EmailProvider, OutgoingEmail, ProviderError};

/// Both providers failed for the same message.
#[derive(Debug, Error)]
#[error("{primary} failed ({primary_error}); {secondary} failed ({secondary_error})")]
pub struct DispatchError {
    pub primary: String,
    pub primary_error: ProviderError,
    pub secondary: String,
    pub secondary_error: ProviderError,
}

pub struct FallbackDispatcher {
    primary: Arc<dyn EmailProvider>,
    secondary: Arc<dyn EmailProvider>,
    call_timeout: Duration,
}

impl FallbackDispatcher {
    pub fn new(
        primary: Arc<dyn EmailProvider>,
        secondary: Arc<dyn EmailProvider>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            call_timeout,
        }
    }

    /// Deliver `email`, returning the name of the provider that accepted it.
    pub async fn dispatch(&self, email: &OutgoingEmail) -> Result<&'static str, DispatchError> {
        let primary_error = match self.call(self.primary.as_ref(), email).await {
            Ok(()) => return Ok(self.primary.name()),
            Err(e) => e,
        };

        tracing::warn!(
            provider = self.primary.name(),
            fallback = self.secondary.name(),
            error = %primary_error,
            "Primary provider failed, attempting fallback"
        );

        match self.call(self.secondary.as_ref(), email).await {
            Ok(()) => Ok(self.secondary.name()),
            Err(secondary_error) => Err(DispatchError {
                primary: self.primary.name().to_string(),
                primary_error,
                secondary: self.secondary.name().to_string(),
                secondary_error,
            }),
        }
    }

    async fn call(
        &self,
        provider: &dyn EmailProvider,
        email: &OutgoingEmail,
    ) -> Result<(), ProviderError> {
        match tokio::time::timeout(self.call_timeout, provider.send(email)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeProvider, email};

    fn dispatcher(a: &Arc<FakeProvider>, b: &Arc<FakeProvider>) -> FallbackDispatcher {
        FallbackDispatcher::new(a.clone(), b.clone(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_primary_success_never_calls_secondary() {
        let a = FakeProvider::ok("SendGrid");
        let b = FakeProvider::ok("Mailgun");

        let used = dispatcher(&a, &b).dispatch(&email()).await.unwrap();

        assert_eq!(used, "SendGrid");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_with_identical_message() {
        let a = FakeProvider::failing("SendGrid", 500);
        let b = FakeProvider::ok("Mailgun");

        let used = dispatcher(&a, &b).dispatch(&email()).await.unwrap();

        assert_eq!(used, "Mailgun");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(a.last_email(), b.last_email());
    }

    #[tokio::test]
    async fn test_both_failing_combines_reasons() {
        let a = FakeProvider::failing("SendGrid", 500);
        let b = FakeProvider::failing("Mailgun", 503);

        let err = dispatcher(&a, &b).dispatch(&email()).await.unwrap_err();
        let message = err.to_string();

        assert!(message.contains("SendGrid failed"));
        assert!(message.contains("unexpected status 500"));
        assert!(message.contains("Mailgun failed"));
        assert!(message.contains("unexpected status 503"));
    }

    #[tokio::test]
    async fn test_provider_name_outlives_dispatcher() {
        let a = FakeProvider::failing("SendGrid", 500);
        let b = FakeProvider::ok("Mailgun");

        let used = {
            let d = dispatcher(&a, &b);
            d.dispatch(&email()).await.unwrap()
        };

        assert_eq!(used, "Mailgun");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provider_times_out_and_falls_back() {
        let a = FakeProvider::hanging("SendGrid");
        let b = FakeProvider::ok("Mailgun");

        let used = dispatcher(&a, &b).dispatch(&email()).await.unwrap();

        assert_eq!(used, "Mailgun");
        assert_eq!(b.calls(), 1);
    }
}
