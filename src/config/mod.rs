use crate::analysis::JoinStrategy;
use crate::scraper::ListingLayout;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Page fetch and row extraction
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_consent_selector")]
    pub consent_selector: String,

    #[serde(default = "default_consent_timeout_secs")]
    pub consent_timeout_secs: u64,

    /// Pause after the consent dialog so the grid finishes rendering.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_rows_timeout_secs")]
    pub rows_timeout_secs: u64,

    #[serde(default = "default_field_timeout_ms")]
    pub field_timeout_ms: u64,

    #[serde(default = "default_stale_retry_limit")]
    pub stale_retry_limit: usize,

    #[serde(default = "default_stale_retry_delay_ms")]
    pub stale_retry_delay_ms: u64,

    /// Upper bound on the time spent on one row index, retries included.
    #[serde(default = "default_row_budget_ms")]
    pub row_budget_ms: u64,

    #[serde(default = "default_high_discount")]
    pub high_discount: f64,

    #[serde(default)]
    pub layout: ListingLayout,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

/// Candidate selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_min_trading_value")]
    pub min_trading_value: i64,

    #[serde(default)]
    pub join: JoinStrategy,
}

/// Pipeline configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Weekend runs only analyse what is already stored unless this is set.
    #[serde(default)]
    pub fetch_on_weekend: bool,
}

/// Text-message delivery (Twilio)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub account_sid: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default)]
    pub from: Option<String>,

    #[serde(default)]
    pub to: Option<String>,

    #[serde(default = "default_notify_api_base")]
    pub api_base: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.money.pl/gielda/gpw/akcje/".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_user_agent() -> String {
    "gpw-momentum/0.1 (end-of-day listing capture)".to_string()
}
fn default_consent_selector() -> String {
    "body > div:nth-of-type(3) > div > div:nth-of-type(2) > div:nth-of-type(3) > div > button:nth-of-type(2)"
        .to_string()
}
fn default_consent_timeout_secs() -> u64 {
    5
}
fn default_settle_ms() -> u64 {
    2000
}
fn default_rows_timeout_secs() -> u64 {
    4
}
fn default_field_timeout_ms() -> u64 {
    4000
}
fn default_stale_retry_limit() -> usize {
    5
}
fn default_stale_retry_delay_ms() -> u64 {
    200
}
fn default_row_budget_ms() -> u64 {
    30_000
}
fn default_high_discount() -> f64 {
    0.95
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/gpw.duckdb")
}
fn default_min_trading_value() -> i64 {
    100_000
}
fn default_notify_api_base() -> String {
    "https://api.twilio.com".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            max_backoff_ms: default_max_backoff_ms(),
            user_agent: default_user_agent(),
            consent_selector: default_consent_selector(),
            consent_timeout_secs: default_consent_timeout_secs(),
            settle_ms: default_settle_ms(),
            rows_timeout_secs: default_rows_timeout_secs(),
            field_timeout_ms: default_field_timeout_ms(),
            stale_retry_limit: default_stale_retry_limit(),
            stale_retry_delay_ms: default_stale_retry_delay_ms(),
            row_budget_ms: default_row_budget_ms(),
            high_discount: default_high_discount(),
            layout: ListingLayout::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_trading_value: default_min_trading_value(),
            join: JoinStrategy::default(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account_sid: None,
            auth_token: None,
            from: None,
            to: None,
            api_base: default_notify_api_base(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("GPW").separator("__"))
            .build()?;

        let app_cfg = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Ignoring unreadable configuration ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}
