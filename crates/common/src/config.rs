use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Address the HTTP API binds to (default: 0.0.0.0:5004)
    pub api_bind_addr: String,

    /// Default sender address for outgoing email
    pub email_from: Option<String>,

    /// SendGrid API key (primary provider)
    pub sendgrid_api_key: Option<String>,

    /// SendGrid API base URL, overridable for testing
    pub sendgrid_base_url: String,

    /// Mailgun sending API key (fallback provider)
    pub mailgun_api_key: Option<String>,

    /// Mailgun sending domain
    pub mailgun_domain: Option<String>,

    /// Mailgun API base URL, overridable for EU region or testing
    pub mailgun_base_url: String,

    /// Per-call timeout for provider HTTP requests in seconds (default: 10)
    pub provider_timeout_secs: u64,

    /// Outbox poll interval in milliseconds (default: 1500)
    pub outbox_poll_interval_ms: u64,

    /// Maximum number of outbox items claimed per cycle (default: 25)
    pub outbox_claim_limit: u32,

    /// Seconds a claim holds before a stuck item is claimed again (default: 900)
    pub outbox_claim_lease_secs: u64,

    /// Whether the API process runs the outbox worker (default: true)
    pub outbox_worker_enabled: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            api_bind_addr: std::env::var("API_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:5004".to_string()),
            email_from: non_empty_var("EMAIL_FROM"),
            sendgrid_api_key: non_empty_var("SENDGRID_API_KEY"),
            sendgrid_base_url: std::env::var("SENDGRID_BASE_URL")
                .unwrap_or_else(|_| "https://api.sendgrid.com".to_string()),
            mailgun_api_key: non_empty_var("MAILGUN_SENDING_API_KEY"),
            mailgun_domain: non_empty_var("MAILGUN_DOMAIN"),
            mailgun_base_url: std::env::var("MAILGUN_BASE_URL")
                .unwrap_or_else(|_| "https://api.mailgun.net".to_string()),
            provider_timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PROVIDER_TIMEOUT_SECS must be a valid u64"))?,
            outbox_poll_interval_ms: std::env::var("OUTBOX_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1500".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("OUTBOX_POLL_INTERVAL_MS must be a valid u64"))?,
            outbox_claim_limit: std::env::var("OUTBOX_CLAIM_LIMIT")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("OUTBOX_CLAIM_LIMIT must be a valid u32"))?,
            outbox_claim_lease_secs: std::env::var("OUTBOX_CLAIM_LEASE_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("OUTBOX_CLAIM_LEASE_SECS must be a valid u64"))?,
            outbox_worker_enabled: std::env::var("OUTBOX_WORKER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("OUTBOX_WORKER_ENABLED must be true or false"))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject worker settings that would stall or spin the outbox loop.
    ///
    /// The claim lease must outlast a full batch where every item exhausts
    /// both providers' timeouts, or live claims would be taken over.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.outbox_claim_limit == 0 {
            anyhow::bail!("OUTBOX_CLAIM_LIMIT must be at least 1");
        }
        if self.outbox_poll_interval_ms == 0 {
            anyhow::bail!("OUTBOX_POLL_INTERVAL_MS must be at least 1");
        }
        if self.provider_timeout_secs == 0 {
            anyhow::bail!("PROVIDER_TIMEOUT_SECS must be at least 1");
        }

        let worst_batch_secs = u64::from(self.outbox_claim_limit)
            .saturating_mul(2)
            .saturating_mul(self.provider_timeout_secs);
        if self.outbox_claim_lease_secs <= worst_batch_secs {
            anyhow::bail!(
                "OUTBOX_CLAIM_LEASE_SECS ({}) must exceed OUTBOX_CLAIM_LIMIT x 2 x PROVIDER_TIMEOUT_SECS ({})",
                self.outbox_claim_lease_secs,
                worst_batch_secs
            );
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn outbox_poll_interval(&self) -> Duration {
        Duration::from_millis(self.outbox_poll_interval_ms)
    }

    pub fn outbox_claim_lease(&self) -> Duration {
        Duration::from_secs(self.outbox_claim_lease_secs)
    }
}

/// Read an env var, treating blank values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".to_string(),
            db_max_connections: 5,
            api_bind_addr: "127.0.0.1:0".to_string(),
            email_from: Some("noreply@herald.test".to_string()),
            sendgrid_api_key: None,
            sendgrid_base_url: "http://127.0.0.1:1".to_string(),
            mailgun_api_key: None,
            mailgun_domain: None,
            mailgun_base_url: "http://127.0.0.1:1".to_string(),
            provider_timeout_secs: 10,
            outbox_poll_interval_ms: 1500,
            outbox_claim_limit: 25,
            outbox_claim_lease_secs: 900,
            outbox_worker_enabled: true,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_zero_claim_limit_rejected() {
        let err = AppConfig {
            outbox_claim_limit: 0,
            ..config()
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("OUTBOX_CLAIM_LIMIT"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = AppConfig {
            outbox_poll_interval_ms: 0,
            ..config()
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("OUTBOX_POLL_INTERVAL_MS"));
    }

    #[test]
    fn test_lease_must_outlast_worst_case_batch() {
        // 25 items x 2 providers x 10s
        let short = AppConfig {
            outbox_claim_lease_secs: 500,
            ..config()
        };
        assert!(short.validate().is_err());

        let enough = AppConfig {
            outbox_claim_lease_secs: 501,
            ..config()
        };
        assert!(enough.validate().is_ok());
    }
}
