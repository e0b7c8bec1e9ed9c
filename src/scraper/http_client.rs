use crate::config::ScraperConfig;
use anyhow::{Context, Result};
use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("throttled with HTTP {0}")]
    Throttled(StatusCode),

    #[error("HTTP error {0}")]
    Status(StatusCode),

    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Throttled(_) | FetchError::Transport(_))
    }
}

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
}

// request_delay_ms * 2^n, saturating, capped at max_backoff_ms
fn backoff(config: &ScraperConfig) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(config.request_delay_ms)
        .max_delay(Duration::from_millis(config.max_backoff_ms))
        .take(config.max_retries as usize)
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // money.pl keeps the consent choice in a cookie
            .cookie_store(true)
            .build()
            .context("Failed to build listing HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);
        let resp = self.inner.get(url).send().await?;
        match resp.status() {
            s if s.is_success() => Ok(resp.text().await?),
            s @ (StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE) => {
                Err(FetchError::Throttled(s))
            }
            s => Err(FetchError::Status(s)),
        }
    }

    /// Fetch a listing page. Throttling and transport failures are retried
    /// with exponential backoff; any other status fails at once.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.polite_delay().await;

        RetryIf::start(
            backoff(&self.config),
            || self.fetch_once(url),
            |e: &FetchError| {
                if e.is_retryable() {
                    warn!("{} failed: {}, retrying", url, e);
                }
                e.is_retryable()
            },
        )
        .await
        .with_context(|| format!("Giving up on {}", url))
    }

    async fn polite_delay(&self) {
        let jitter = rand::rng().random_range(0..=self.config.jitter_ms);
        sleep(Duration::from_millis(self.config.request_delay_ms.saturating_add(jitter))).await;
    }
}
