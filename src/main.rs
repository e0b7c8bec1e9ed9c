mod analysis;
mod calendar;
mod config;
mod loader;
mod models;
mod notify;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::analysis::{MomentumAnalyzer, message_body};
use crate::calendar::{TradingWindow, parse_date_arg, resolve_today, resolve_window};
use crate::config::AppConfig;
use crate::models::{Candidate, DateKey};
use crate::notify::{TwilioNotifier, deliver};
use crate::pipeline::Pipeline;
use crate::scraper::page::HtmlListingPage;
use crate::storage::SnapshotStore;

#[derive(Parser)]
#[command(
    name = "gpw-momentum",
    about = "GPW end-of-day listing capture and three-day momentum screen",
    version
)]
struct Cli {
    /// Capture a single trading day (YYYY-MM-DD or YYYY_MM_DD); without it, run the daily flow
    date: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,

    /// DuckDB file, overrides storage.db_path
    #[arg(long, env = "GPW_DB_PATH", global = true)]
    db: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Capture today and the two prior trading days, then rank candidates
    Run {
        /// Pretend the clock reads this date
        #[arg(long)]
        as_of: Option<String>,

        /// Text the candidate list to notify.to
        #[arg(long)]
        notify: bool,

        #[arg(long)]
        json: bool,
    },

    /// Rank candidates from already captured days
    Analyze {
        #[arg(long)]
        as_of: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List captured trading days
    Snapshots,

    /// Fill a missing day from a CSV copy of the listing
    ImportCsv { date: String, path: PathBuf },

    /// Write a captured day to CSV
    ExportCsv { date: String, path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "gpw_momentum=info,warn",
        1 => "gpw_momentum=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    match (cli.date, cli.command) {
        (Some(_), Some(_)) => bail!("Pass either a date or a subcommand, not both"),
        (Some(date), None) => ingest_single(config, &date).await,
        (None, None) => run(config, None, false, false).await,
        (None, Some(Command::Run { as_of, notify, json })) => run(config, as_of, notify, json).await,
        (None, Some(Command::Analyze { as_of, json })) => analyze(&config, as_of, json),
        (None, Some(Command::Snapshots)) => snapshots(&config),
        (None, Some(Command::ImportCsv { date, path })) => {
            let _t = utils::Timer::start("CSV import");
            let store = SnapshotStore::open(&config.storage.db_path)?;
            let stats = loader::import_listing_csv(
                &store,
                required_date(&date)?,
                &path,
                config.scraper.high_discount,
            )?;
            println!("{} rows imported, {} skipped", stats.rows, stats.skipped);
            Ok(())
        }
        (None, Some(Command::ExportCsv { date, path })) => {
            let store = SnapshotStore::open(&config.storage.db_path)?;
            let n = loader::export_snapshot_csv(&store, required_date(&date)?, &path)?;
            println!("{} rows written to {}", n, path.display());
            Ok(())
        }
    }
}

fn required_date(raw: &str) -> Result<DateKey> {
    parse_date_arg(raw)
        .map(DateKey::new)
        .with_context(|| format!("Invalid date {raw:?}, expected YYYY-MM-DD or YYYY_MM_DD"))
}

fn print_candidates(candidates: &[Candidate], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(candidates)?);
    } else if candidates.is_empty() {
        println!("No candidates.");
    } else {
        println!("{}", message_body(candidates));
    }
    Ok(())
}

async fn ingest_single(config: AppConfig, date: &str) -> Result<()> {
    let _t = utils::Timer::start(format!("Capture {date}"));
    let store = SnapshotStore::open(&config.storage.db_path)?;
    let page = HtmlListingPage::new(&config.scraper)?;

    let mut pipeline = Pipeline::new(config, page, store);
    let outcome = pipeline.ingest_arg(date).await;
    pipeline.close().await;

    if let Some(outcome) = outcome? {
        info!("{}: {:?}", date, outcome);
    }
    Ok(())
}

async fn run(config: AppConfig, as_of: Option<String>, notify: bool, json: bool) -> Result<()> {
    let _t = utils::Timer::start("Daily run");
    let clock: NaiveDate = match as_of {
        Some(raw) => required_date(&raw)?.date(),
        None => Local::now().date_naive(),
    };

    let store = SnapshotStore::open(&config.storage.db_path)?;
    let page = HtmlListingPage::new(&config.scraper)?;
    let notify_cfg = config.notify.clone();

    let mut pipeline = Pipeline::new(config, page, store);
    let outcome = pipeline.run_daily(clock).await;
    if let Ok(report) = &outcome {
        for key in report.window.keys() {
            if let Ok(n) = pipeline.store().row_count(key) {
                info!("{}: {} rows stored", key, utils::fmt_count(n));
            }
        }
    }
    pipeline.close().await;

    let Some(candidates) = outcome?.candidates else {
        return Ok(());
    };
    print_candidates(&candidates, json)?;

    if notify || notify_cfg.enabled {
        match TwilioNotifier::from_config(&notify_cfg) {
            Ok(twilio) => deliver(&twilio, &notify_cfg, &message_body(&candidates)).await,
            Err(e) => warn!("Notifications disabled: {}", e),
        }
    }
    Ok(())
}

fn analyze(config: &AppConfig, as_of: Option<String>, json: bool) -> Result<()> {
    let window: TradingWindow = match as_of {
        Some(raw) => resolve_window(required_date(&raw)?.date()),
        None => resolve_today(),
    };
    let store = SnapshotStore::open(&config.storage.db_path)?;

    let missing = store.missing(&window.keys())?;
    if !missing.is_empty() {
        let days: Vec<String> = missing.iter().map(|k| k.to_string()).collect();
        println!("Not captured yet: {}", days.join(", "));
        return Ok(());
    }

    let candidates = MomentumAnalyzer::new(&config.analysis).analyze(&store, &window)?;
    print_candidates(&candidates, json)
}

fn snapshots(config: &AppConfig) -> Result<()> {
    let store = SnapshotStore::open(&config.storage.db_path)?;
    let keys = store.list_snapshots()?;
    if keys.is_empty() {
        println!("No captured days, run `gpw-momentum` first.");
        return Ok(());
    }

    println!("─────────────────────────────────");
    println!("  {} captured trading days", keys.len());
    println!("─────────────────────────────────");
    for key in &keys {
        let rows = store.row_count(*key)?;
        println!("  {}  {:>9} rows", key, utils::fmt_count(rows));
    }
    println!("─────────────────────────────────");
    Ok(())
}
