//! `PageSession` over a fetched HTML document. Reads succeed at once or time out.

use super::http_client::HttpClient;
use super::{PageError, PageSession};
use crate::config::ScraperConfig;
use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;

pub struct HtmlListingPage {
    client: HttpClient,
    document: Option<Html>,
}

impl HtmlListingPage {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            document: None,
        })
    }

    fn document(&self) -> Result<&Html, PageError> {
        self.document.as_ref().ok_or(PageError::NotLoaded)
    }
}

fn parse_selector(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|_| PageError::InvalidSelector(selector.to_string()))
}

fn visible_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait(?Send)]
impl PageSession for HtmlListingPage {
    async fn load(&mut self, url: &str) -> Result<(), PageError> {
        let html = self
            .client
            .get_text(url)
            .await
            .map_err(|e| PageError::Load(format!("{e:#}")))?;
        debug!("Loaded {} ({} bytes)", url, html.len());
        self.document = Some(Html::parse_document(&html));
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<String, PageError> {
        let sel = parse_selector(selector)?;
        self.document()?
            .select(&sel)
            .next()
            .map(visible_text)
            .ok_or_else(|| PageError::Timeout {
                selector: selector.to_string(),
                timeout,
            })
    }

    async fn count_visible(&self, selector: &str, timeout: Duration) -> Result<usize, PageError> {
        let sel = parse_selector(selector)?;
        match self.document()?.select(&sel).count() {
            0 => Err(PageError::Timeout {
                selector: selector.to_string(),
                timeout,
            }),
            n => Ok(n),
        }
    }

    /// Consent dialogs are script-driven; the fetched markup only proves the button exists.
    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        self.wait_for_visible(selector, timeout).await.map(|_| ())
    }

    async fn close(&mut self) -> Result<(), PageError> {
        self.document = None;
        Ok(())
    }
}
