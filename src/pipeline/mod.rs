//! Pipeline orchestrator: ties calendar → page → storage → analysis together.
//!
//! ## Run modes
//!
//! `run_daily()`: resolve the three-day window, capture any day whose
//!   segment is missing, then rank candidates once all three exist.
//!   Idempotent: a captured day is never fetched again.
//!
//! `ingest()` / `ingest_arg()`: capture one trading day.
//!
//! The pipeline owns the page session and the store. Call `close()` on every
//! exit path to release the session; the store closes on drop.

use crate::calendar::{TradingWindow, is_weekend, parse_date_arg, resolve_window};
use crate::config::AppConfig;
use crate::analysis::MomentumAnalyzer;
use crate::models::{Candidate, DateKey};
use crate::scraper::extractor::{ExtractPolicy, RowExtractor};
use crate::scraper::{PageSession, listing_url};
use crate::storage::SnapshotStore;
use anyhow::Result;
use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    AlreadyCaptured,
    Captured { rows: usize, skipped: usize },
    /// The page could not be fetched; the day stays unprovisioned.
    LoadFailed,
    /// The row grid never appeared; the day stays unprovisioned.
    RowsUnavailable,
}

#[derive(Debug)]
pub struct RunReport {
    pub window: TradingWindow,
    pub ingested: Vec<(DateKey, IngestOutcome)>,
    /// `None` when at least one day of the window is missing.
    pub candidates: Option<Vec<Candidate>>,
}

pub struct Pipeline<P: PageSession> {
    config: AppConfig,
    policy: ExtractPolicy,
    page: P,
    store: SnapshotStore,
}

impl<P: PageSession> Pipeline<P> {
    pub fn new(config: AppConfig, page: P, store: SnapshotStore) -> Self {
        let policy = ExtractPolicy::from_config(&config.scraper);
        Self {
            config,
            policy,
            page,
            store,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn close(mut self) {
        if let Err(e) = self.page.close().await {
            warn!("Failed to close page session: {}", e);
        }
    }

    /// Capture one day from a `YYYY-MM-DD` / `YYYY_MM_DD` argument.
    /// An unparsable date is logged and yields `None`.
    pub async fn ingest_arg(&mut self, raw: &str) -> Result<Option<IngestOutcome>> {
        let Some(date) = parse_date_arg(raw) else {
            warn!("Error while parsing date {:?}, expected YYYY-MM-DD or YYYY_MM_DD", raw);
            return Ok(None);
        };
        self.ingest(DateKey::new(date)).await.map(Some)
    }

    async fn dismiss_consent(&self) {
        let cfg = &self.config.scraper;
        let timeout = Duration::from_secs(cfg.consent_timeout_secs);
        if let Err(e) = self.page.click(&cfg.consent_selector, timeout).await {
            warn!("Error while accepting cookies: {}", e);
        }
        tokio::time::sleep(Duration::from_millis(cfg.settle_ms)).await;
    }

    pub async fn ingest(&mut self, key: DateKey) -> Result<IngestOutcome> {
        if self.store.exists(key)? {
            info!("Table {} already exists, skipping capture", key.table_name());
            return Ok(IngestOutcome::AlreadyCaptured);
        }

        let url = listing_url(&self.config.scraper.base_url, key)?;
        info!("Capturing {} from {}", key, url);
        if let Err(e) = self.page.load(url.as_str()).await {
            warn!("{}: {}", key, e);
            return Ok(IngestOutcome::LoadFailed);
        }
        self.dismiss_consent().await;

        let extractor = RowExtractor::new(&self.page, &self.config.scraper.layout, &self.policy);
        let mut cursor = match extractor.start().await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!("{}: {}", key, e);
                return Ok(IngestOutcome::RowsUnavailable);
            }
        };

        self.store.provision(key)?;
        let (mut rows, mut skipped) = (0usize, 0usize);

        while let Some((index, result)) = cursor.next_row().await {
            let stored = result
                .map_err(anyhow::Error::from)
                .and_then(|row| Ok(self.store.append(key, index, &row)?));
            match stored {
                Ok(()) => rows += 1,
                Err(e) => {
                    warn!("Error while retrieving row {}: {:#}", index, e);
                    skipped += 1;
                }
            }
        }

        info!(
            "{}: {} of {} rows stored ({} skipped)",
            key,
            rows,
            cursor.total(),
            skipped
        );
        Ok(IngestOutcome::Captured { rows, skipped })
    }

    pub async fn run_daily(&mut self, clock: NaiveDate) -> Result<RunReport> {
        let window = resolve_window(clock);
        let weekend = is_weekend(clock);
        info!(
            "Window: today={} prev={} before={}",
            window.today, window.prev_trading_day, window.day_before_that
        );

        let mut ingested = Vec::new();
        if weekend && !self.config.pipeline.fetch_on_weekend {
            info!("{} is a weekend, using stored snapshots only", clock);
        } else {
            for key in window.keys() {
                let outcome = self.ingest(key).await?;
                debug!("{}: {:?}", key, outcome);
                ingested.push((key, outcome));
            }
        }

        if let Some(key) = self.store.missing(&window.keys())?.first() {
            if weekend {
                info!("No stored data for {}, nothing to compare", key);
            } else {
                warn!("{} was not captured, skipping analysis", key);
            }
            return Ok(RunReport {
                window,
                ingested,
                candidates: None,
            });
        }

        let analyzer = MomentumAnalyzer::new(&self.config.analysis);
        let candidates = analyzer.analyze(&self.store, &window)?;
        Ok(RunReport {
            window,
            ingested,
            candidates: Some(candidates),
        })
    }
}
