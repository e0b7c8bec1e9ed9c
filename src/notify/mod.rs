//! Text-message delivery of the candidate list. [`deliver`] logs failures
//! and never returns them.

use crate::config::NotifyConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Gateway error: {0}")]
    Gateway(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<(), NotifyError>;
    fn name(&self) -> &str;
}

// ── Twilio ────────────────────────────────────────────────────────────────────

pub struct TwilioNotifier {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

fn required(value: &Option<String>, what: &str) -> Result<String, NotifyError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| NotifyError::Config(format!("{what} is not set")))
}

impl TwilioNotifier {
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;

        Ok(Self {
            client,
            account_sid: required(&config.account_sid, "notify.account_sid")?,
            auth_token: required(&config.auth_token, "notify.auth_token")?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await
            .map_err(|e| NotifyError::Gateway(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Gateway(format!("HTTP {}: {}", status, text)));
        }

        let message: MessageResponse = resp
            .json()
            .await
            .map_err(|e| NotifyError::Gateway(format!("unexpected response: {e}")))?;
        info!("Message queued as {}", message.sid);
        Ok(())
    }

    fn name(&self) -> &str {
        "twilio"
    }
}

// ── Delivery ──────────────────────────────────────────────────────────────────

pub async fn deliver(notifier: &dyn Notifier, config: &NotifyConfig, body: &str) {
    if body.is_empty() {
        info!("No candidates, nothing to send");
        return;
    }
    let (Some(to), Some(from)) = (config.to.as_deref(), config.from.as_deref()) else {
        warn!("notify.to / notify.from not set, skipping {} delivery", notifier.name());
        return;
    };

    match notifier.send(to, from, body).await {
        Ok(()) => info!("Candidates sent via {}", notifier.name()),
        Err(e) => warn!("Failed to send candidates via {}: {}", notifier.name(), e),
    }
}
