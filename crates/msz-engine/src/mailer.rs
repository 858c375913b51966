//! Completion notification via the Mailgun HTTP API.
//!
//! Invoked once, fire-and-forget, when a job reaches `done`. Delivery
//! failures are logged by the caller and never touch job state. Without
//! Mailgun credentials in the environment the mailer is a logging no-op.

use reqwest::Client;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Mailgun connection settings.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub api_key: String,
    pub domain: String,
    pub sender: String,
    /// Overridable for tests
    pub api_base: String,
}

impl MailerConfig {
    /// Read Mailgun settings from the environment; `None` when the API key
    /// or domain is missing.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("MAILGUN_API_KEY").ok()?;
        let domain = std::env::var("MAILGUN_DOMAIN").ok()?;
        Some(Self {
            api_key,
            domain,
            sender: std::env::var("SENDER_EMAIL")
                .unwrap_or_else(|_| "no-reply@mailsized.com".to_string()),
            api_base: std::env::var("MAILGUN_API_BASE")
                .unwrap_or_else(|_| "https://api.mailgun.net".to_string()),
        })
    }
}

/// Outbound email dispatcher.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: Option<MailerConfig>,
    http: Client,
}

impl Mailer {
    pub fn new(config: Option<MailerConfig>) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(MailerConfig::from_env())
    }

    /// A mailer that drops everything (tests, local dev).
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Send the "your video is ready" notification.
    pub async fn send_download_ready(
        &self,
        recipient: &str,
        download_url: &str,
        expiry_min: u64,
    ) -> EngineResult<()> {
        let Some(config) = &self.config else {
            debug!("mailer not configured, skipping notification");
            return Ok(());
        };

        let body = format!(
            "Your video is ready for the next {} minutes:\n{}",
            expiry_min, download_url
        );
        let endpoint = format!("{}/v3/{}/messages", config.api_base, config.domain);

        let response = self
            .http
            .post(&endpoint)
            .basic_auth("api", Some(&config.api_key))
            .form(&[
                ("from", config.sender.as_str()),
                ("to", recipient),
                ("subject", "Your compressed video is ready"),
                ("text", body.as_str()),
                ("h:Auto-Submitted", "auto-generated"),
                ("h:X-Auto-Response-Suppress", "All"),
                ("h:Reply-To", "no-reply@mailsized.com"),
            ])
            .send()
            .await
            .map_err(|err| EngineError::Email(err.to_string()))?;

        response
            .error_for_status()
            .map_err(|err| EngineError::Email(err.to_string()))?;

        info!(recipient, "completion email dispatched");
        Ok(())
    }
}
