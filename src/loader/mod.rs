//! CSV import/export of single-day snapshots.

use crate::models::{DateKey, RawListingRow};
use crate::scraper::cleaner::clean_listing_row;
use crate::storage::SnapshotStore;
use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Default, PartialEq)]
pub struct ImportStats {
    pub rows: usize,
    pub skipped: usize,
}

/// Populate `key` from a listing CSV with a header line.
pub fn import_listing_csv(
    store: &SnapshotStore,
    key: DateKey,
    path: &Path,
    high_discount: f64,
) -> Result<ImportStats> {
    if store.exists(key)? {
        bail!("{} is already captured", key.table_name());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    store.provision(key)?;
    let mut stats = ImportStats::default();

    for (i, result) in reader.records().enumerate() {
        let index = i + 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {} in {:?}: {}", index, path, e);
                stats.skipped += 1;
                continue;
            }
        };

        let cell = |n: usize| record.get(n).unwrap_or_default().to_string();
        let raw = RawListingRow {
            name: cell(0),
            change: cell(1),
            close: cell(2),
            volume: cell(3),
            high: cell(4),
        };

        match clean_listing_row(&raw, high_discount) {
            Ok(row) => {
                store.append(key, index, &row)?;
                stats.rows += 1;
            }
            Err(e) => {
                debug!("Row {} in {:?} skipped: {}", index, path, e);
                stats.skipped += 1;
            }
        }
    }

    info!("{}: {} rows imported, {} skipped", key, stats.rows, stats.skipped);
    Ok(stats)
}

pub fn export_snapshot_csv(store: &SnapshotStore, key: DateKey, path: &Path) -> Result<usize> {
    let rows = store.rows(key)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("{}: {} rows written to {:?}", key, rows.len(), path);
    Ok(rows.len())
}
