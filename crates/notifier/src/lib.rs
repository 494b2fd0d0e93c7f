//! Notification outbox delivery.
//!
//! The [`worker::OutboxWorker`] drains the outbox through a
//! [`store::OutboxStore`], renders content with [`template::render`] and
//! delivers via the [`dispatcher::FallbackDispatcher`] (SendGrid, then
//! Mailgun). Failures are retried with exponential backoff
//! ([`retry::RetryPolicy`]) and dead-lettered once the budget is spent.

pub mod dispatcher;
pub mod provider;
pub mod retry;
pub mod store;
pub mod template;
pub mod worker;

#[cfg(test)]
mod test_support;
