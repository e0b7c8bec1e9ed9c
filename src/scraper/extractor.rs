//! Row-by-row extraction from a loaded listing page.
//!
//! The row count is fixed when extraction starts; rows rendered afterwards
//! are never visited. Each index is read field by field. A stale element
//! re-reads the same index, bounded by an attempt cap and a per-row time
//! budget. Any other failure is reported for that index and the cursor
//! moves on.

use super::cleaner::{CleanError, clean_listing_row};
use super::{Field, ListingLayout, PageError, PageSession};
use crate::config::ScraperConfig;
use crate::models::{RawListingRow, Row};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, trace};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("row container not visible: {0}")]
    RowsUnavailable(#[source] PageError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error("row {index} still stale after {attempts} attempts")]
    StaleExhausted { index: usize, attempts: usize },

    #[error("row {index} not read within {budget:?}")]
    BudgetExceeded { index: usize, budget: Duration },
}

impl ExtractError {
    pub fn is_stale(&self) -> bool {
        matches!(self, ExtractError::Page(PageError::Stale(_)))
    }
}

#[derive(Debug, Clone)]
pub struct ExtractPolicy {
    pub rows_timeout: Duration,
    pub field_timeout: Duration,
    pub stale_retry_limit: usize,
    pub stale_retry_delay: Duration,
    pub row_budget: Duration,
    pub high_discount: f64,
}

impl ExtractPolicy {
    pub fn from_config(cfg: &ScraperConfig) -> Self {
        Self {
            rows_timeout: Duration::from_secs(cfg.rows_timeout_secs),
            field_timeout: Duration::from_millis(cfg.field_timeout_ms),
            stale_retry_limit: cfg.stale_retry_limit,
            stale_retry_delay: Duration::from_millis(cfg.stale_retry_delay_ms),
            row_budget: Duration::from_millis(cfg.row_budget_ms),
            high_discount: cfg.high_discount,
        }
    }
}

pub struct RowExtractor<'a, P: ?Sized> {
    page: &'a P,
    layout: &'a ListingLayout,
    policy: &'a ExtractPolicy,
}

impl<'a, P: PageSession + ?Sized> RowExtractor<'a, P> {
    pub fn new(page: &'a P, layout: &'a ListingLayout, policy: &'a ExtractPolicy) -> Self {
        Self { page, layout, policy }
    }

    pub async fn start(self) -> Result<RowCursor<'a, P>, ExtractError> {
        let total = self
            .page
            .count_visible(&self.layout.row_selector, self.policy.rows_timeout)
            .await
            .map_err(ExtractError::RowsUnavailable)?;
        info!("{} listing rows on page", total);

        Ok(RowCursor {
            extractor: self,
            next_index: 1,
            total,
        })
    }

    async fn read_field(&self, index: usize, field: Field) -> Result<String, PageError> {
        let selector = self.layout.cell_selector(index, field);
        trace!("Row {} {}: {}", index, field.label(), selector);
        self.page
            .wait_for_visible(&selector, self.policy.field_timeout)
            .await
    }

    async fn read_row(&self, index: usize) -> Result<Row, ExtractError> {
        let raw = RawListingRow {
            name: self.read_field(index, Field::Name).await?,
            change: self.read_field(index, Field::Change).await?,
            close: self.read_field(index, Field::Close).await?,
            volume: self.read_field(index, Field::Volume).await?,
            high: self.read_field(index, Field::High).await?,
        };
        Ok(clean_listing_row(&raw, self.policy.high_discount)?)
    }

    async fn read_row_bounded(&self, index: usize) -> Result<Row, ExtractError> {
        let strategy =
            FixedInterval::new(self.policy.stale_retry_delay).take(self.policy.stale_retry_limit);
        let this = self;
        let attempt = RetryIf::start(
            strategy,
            move || this.read_row(index),
            |e: &ExtractError| {
                if e.is_stale() {
                    debug!("Row {}: {}, re-reading", index, e);
                }
                e.is_stale()
            },
        );

        match tokio::time::timeout(self.policy.row_budget, attempt).await {
            Err(_) => Err(ExtractError::BudgetExceeded {
                index,
                budget: self.policy.row_budget,
            }),
            Ok(Err(e)) if e.is_stale() => Err(ExtractError::StaleExhausted {
                index,
                attempts: self.policy.stale_retry_limit + 1,
            }),
            Ok(result) => result,
        }
    }
}

pub struct RowCursor<'a, P: ?Sized> {
    extractor: RowExtractor<'a, P>,
    next_index: usize,
    total: usize,
}

impl<P: PageSession + ?Sized> RowCursor<'_, P> {
    pub fn total(&self) -> usize {
        self.total
    }

    /// Read the next index. `None` once every row counted at start was visited.
    pub async fn next_row(&mut self) -> Option<(usize, Result<Row, ExtractError>)> {
        if self.next_index > self.total {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some((index, self.extractor.read_row_bounded(index).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::FakePage;

    fn policy() -> ExtractPolicy {
        ExtractPolicy {
            rows_timeout: Duration::from_millis(10),
            field_timeout: Duration::from_millis(10),
            stale_retry_limit: 3,
            stale_retry_delay: Duration::ZERO,
            row_budget: Duration::from_secs(5),
            high_discount: 0.95,
        }
    }

    const ROWS: [[&str; 5]; 3] = [
        ["ALLEGRO", "2,15", "31,05", "1 204 331", "31,20"],
        ["BUDIMEX", "—", "612,00", "—", "612,00"],
        ["CDPROJEKT", "-1,10", "118,40", "402 118", "121,00"],
    ];

    async fn loaded(page: FakePage) -> FakePage {
        let mut page = page.with_listing("date=2024-03-08", &ROWS);
        page.load("https://example.test/?date=2024-03-08").await.unwrap();
        page
    }

    async fn drain(page: &FakePage, policy: &ExtractPolicy) -> Vec<(usize, Result<Row, ExtractError>)> {
        let layout = ListingLayout::default();
        let mut cursor = RowExtractor::new(page, &layout, policy).start().await.unwrap();
        let mut out = Vec::new();
        while let Some(item) = cursor.next_row().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_all_rows_in_source_order() {
        let page = loaded(FakePage::new()).await;
        let rows = drain(&page, &policy()).await;

        let names: Vec<_> = rows
            .iter()
            .map(|(i, r)| (*i, r.as_ref().unwrap().company_name.clone()))
            .collect();
        assert_eq!(
            names,
            vec![(1, "ALLEGRO".into()), (2, "BUDIMEX".into()), (3, "CDPROJEKT".into())]
        );
        let budimex = rows[1].1.as_ref().unwrap();
        assert_eq!(budimex.value_change, 0.0);
        assert_eq!(budimex.trading_value, 0);
    }

    #[tokio::test]
    async fn test_single_stale_read_retries_same_index() {
        let page = loaded(FakePage::new().with_stale(2, Field::Close, 1)).await;
        let rows = drain(&page, &policy()).await;

        assert_eq!(rows.len(), 3);
        let ok: Vec<_> = rows.iter().filter_map(|(_, r)| r.as_ref().ok()).collect();
        assert_eq!(ok.len(), 3);
        assert_eq!(ok.iter().filter(|r| r.company_name == "BUDIMEX").count(), 1);
        assert_eq!(rows[1].0, 2);

        // Row 2's name was read once before the stale close and once on the retry.
        let name_sel = ListingLayout::default().cell_selector(2, Field::Name);
        let name_reads = page.reads.borrow().iter().filter(|s| **s == name_sel).count();
        assert_eq!(name_reads, 2);
    }

    #[tokio::test]
    async fn test_persistent_staleness_is_bounded() {
        let page = loaded(FakePage::new().with_stale(1, Field::Name, usize::MAX)).await;
        let rows = drain(&page, &policy()).await;

        assert_eq!(rows.len(), 3);
        match &rows[0].1 {
            Err(ExtractError::StaleExhausted { index, attempts }) => {
                assert_eq!(*index, 1);
                assert_eq!(*attempts, 4);
            }
            other => panic!("expected StaleExhausted, got {:?}", other),
        }
        assert!(rows[1].1.is_ok());
        assert!(rows[2].1.is_ok());
    }

    #[tokio::test]
    async fn test_row_budget_cuts_off_retries() {
        let page = loaded(FakePage::new().with_stale(1, Field::Name, usize::MAX)).await;
        let policy = ExtractPolicy {
            stale_retry_limit: 100,
            stale_retry_delay: Duration::from_millis(20),
            row_budget: Duration::from_millis(50),
            ..policy()
        };
        let rows = drain(&page, &policy).await;

        assert_eq!(rows.len(), 3);
        match &rows[0] {
            (1, Err(ExtractError::BudgetExceeded { index, budget })) => {
                assert_eq!(*index, 1);
                assert_eq!(*budget, Duration::from_millis(50));
            }
            other => panic!("expected BudgetExceeded, got {:?}", other),
        }
        assert_eq!(rows[1].0, 2);
        assert_eq!(rows[1].1.as_ref().unwrap().company_name, "BUDIMEX");
        assert!(rows[2].1.is_ok());
    }

    #[tokio::test]
    async fn test_other_failures_skip_the_index() {
        let page = loaded(FakePage::new().with_missing(3, Field::High)).await;
        let rows = drain(&page, &policy()).await;

        assert_eq!(rows.len(), 3);
        assert!(matches!(rows[2].1, Err(ExtractError::Page(PageError::Timeout { .. }))));

        // Timeouts are not retried.
        let high_sel = ListingLayout::default().cell_selector(3, Field::High);
        assert_eq!(page.reads.borrow().iter().filter(|s| **s == high_sel).count(), 1);
    }

    #[tokio::test]
    async fn test_row_count_is_fixed_at_start() {
        let page = loaded(FakePage::new().with_count(2)).await;
        let rows = drain(&page, &policy()).await;
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_container() {
        let mut page = FakePage::new().with_listing("date=2024-03-09", &[]);
        page.load("https://example.test/?date=2024-03-09").await.unwrap();
        let layout = ListingLayout::default();
        let policy = policy();

        let result = RowExtractor::new(&page, &layout, &policy).start().await;
        assert!(matches!(result, Err(ExtractError::RowsUnavailable(PageError::Timeout { .. }))));
    }
}
