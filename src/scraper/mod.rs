pub mod cleaner;
pub mod extractor;
pub mod http_client;
pub mod page;

use crate::models::DateKey;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ── Page session ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PageError {
    #[error("timed out after {timeout:?} waiting for `{selector}`")]
    Timeout { selector: String, timeout: Duration },

    #[error("element `{0}` went stale")]
    Stale(String),

    #[error("no page loaded")]
    NotLoaded,

    #[error("invalid selector `{0}`")]
    InvalidSelector(String),

    #[error("page load failed: {0}")]
    Load(String),
}

/// The slice of a browser session the extractor relies on.
#[async_trait(?Send)]
pub trait PageSession {
    async fn load(&mut self, url: &str) -> Result<(), PageError>;

    async fn wait_for_visible(&self, selector: &str, timeout: Duration)
        -> Result<String, PageError>;

    async fn count_visible(&self, selector: &str, timeout: Duration) -> Result<usize, PageError>;

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), PageError>;

    async fn close(&mut self) -> Result<(), PageError>;
}

// ── Listing layout ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Change,
    Close,
    Volume,
    High,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "company_name",
            Field::Change => "value_change",
            Field::Close => "end_day_value",
            Field::Volume => "trading_value",
            Field::High => "session_high",
        }
    }
}

/// Where each field sits in the rendered grid. Columns are 1-based, as in `nth-child`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListingLayout {
    pub row_selector: String,
    pub name_column: usize,
    pub close_column: usize,
    pub change_column: usize,
    pub high_column: usize,
    pub volume_column: usize,
}

impl Default for ListingLayout {
    fn default() -> Self {
        Self {
            row_selector: "div.rt-tr-group".to_string(),
            name_column: 1,
            close_column: 2,
            change_column: 3,
            high_column: 6,
            volume_column: 8,
        }
    }
}

impl ListingLayout {
    fn column(&self, field: Field) -> usize {
        match field {
            Field::Name => self.name_column,
            Field::Change => self.change_column,
            Field::Close => self.close_column,
            Field::Volume => self.volume_column,
            Field::High => self.high_column,
        }
    }

    /// CSS selector for one cell. `index` is the 1-based row position.
    pub fn cell_selector(&self, index: usize, field: Field) -> String {
        let cell = format!(
            "{}:nth-child({}) > div:nth-child(1) > div:nth-child({})",
            self.row_selector,
            index,
            self.column(field)
        );
        match field {
            // The name is wrapped in a link to the company page.
            Field::Name => format!("{cell} > a:nth-child(1) > div:nth-child(1)"),
            _ => format!("{cell} > div:nth-child(1)"),
        }
    }
}

pub fn listing_url(base_url: &str, key: DateKey) -> Result<Url> {
    let mut url =
        Url::parse(base_url).with_context(|| format!("Invalid listing base URL {base_url:?}"))?;
    url.query_pairs_mut().append_pair("date", &key.query_value());
    Ok(url)
}

// ── Test double ───────────────────────────────────────────────────────────────
