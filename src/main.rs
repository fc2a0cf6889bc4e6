mod assets;
mod collector;
mod config;
mod db;
mod model;
mod parser;
mod render;
mod report;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use assets::AssetFetcher;
use collector::{CollectionSession, SessionOptions, SessionOutcome};
use config::Config;
use model::{AdRecord, AdStatus};
use parser::platforms::PlatformTable;
use parser::FieldExtractor;
use render::snapshot::SnapshotPage;
use render::RenderPage;

#[derive(Parser)]
#[command(name = "ads_scraper", about = "Facebook Ads Library collector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scroll the ads library and store every distinct ad
    Scrape {
        /// Max ads to collect (default: MAX_ADS or 50)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Consecutive scans without a new ad before giving up
        #[arg(long)]
        stall_limit: Option<usize>,
        /// Hard ceiling on scroll iterations
        #[arg(long)]
        iteration_limit: Option<usize>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        /// Ads library URL to open
        #[arg(long)]
        url: Option<String>,
        /// Replay saved HTML snapshots from this directory instead of a browser
        #[arg(long)]
        snapshots: Option<PathBuf>,
        /// Write the HTML report afterwards
        #[arg(long)]
        report: bool,
    },
    /// Generate the HTML report from stored ads
    Report,
    /// Stored ads table
    List {
        /// Filter by status (active, inactive)
        #[arg(short, long, value_parser = parse_status)]
        status: Option<AdStatus>,
        /// Filter by platform (e.g. Instagram)
        #[arg(short, long)]
        platform: Option<String>,
        /// Earliest start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest start date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Only ads with (true) or without (false) multiple versions
        #[arg(long)]
        multiple_versions: Option<bool>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show aggregate counts
    Stats,
    /// Show one stored ad
    Show {
        /// Library ID
        id: String,
    },
}

fn parse_status(s: &str) -> Result<AdStatus, String> {
    AdStatus::parse(s).ok_or_else(|| format!("unknown status {s:?} (expected active, inactive or unknown)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut cfg = Config::from_env()?;

    let result = match cli.command {
        Commands::Scrape {
            limit,
            stall_limit,
            iteration_limit,
            headed,
            url,
            snapshots,
            report,
        } => {
            if let Some(n) = stall_limit {
                cfg.stall_limit = n;
            }
            if let Some(n) = iteration_limit {
                cfg.iteration_limit = n;
            }
            if headed {
                cfg.headless = false;
            }
            if let Some(url) = url {
                cfg.ads_url = url;
            }
            if snapshots.is_some() {
                cfg.snapshot_dir = snapshots;
            }
            let target = limit.unwrap_or(cfg.max_ads);

            let mut store = db::Store::open(&cfg.db_path)?;
            let cancel = cancel_on_ctrl_c();

            println!("Collecting up to {} ads...", target);
            let outcome = match &cfg.snapshot_dir {
                Some(dir) => {
                    let page = SnapshotPage::from_dir(dir)?;
                    let mut options = cfg.session_options();
                    options.settle = Duration::ZERO;
                    options.initial_wait = Duration::ZERO;
                    run_session(page, &cfg, options, target, cancel, &mut store).await?
                }
                None => {
                    let page = collector::launch_chromium(cfg.headless).await?;
                    let options = cfg.session_options();
                    run_session(page, &cfg, options, target, cancel, &mut store).await?
                }
            };

            print_ads(&outcome.records);
            let summary = &outcome.summary;
            println!(
                "\nDone: {} ads ({}), {} assets downloaded, {} not persisted.",
                summary.records,
                summary.termination,
                summary.tally.assets_downloaded,
                summary.tally.sink_failures
            );

            if report {
                let ads = stored_records(store.conn())?;
                let path = report::write_report(&cfg.reports_dir, &ads)?;
                println!("Report: {}", path.display());
            }
            Ok(())
        }
        Commands::Report => {
            let store = db::Store::open(&cfg.db_path)?;
            let ads = stored_records(store.conn())?;
            let path = report::write_report(&cfg.reports_dir, &ads)?;
            println!("Report for {} ads: {}", ads.len(), path.display());
            Ok(())
        }
        Commands::List {
            status,
            platform,
            from,
            to,
            multiple_versions,
            limit,
        } => {
            let store = db::Store::open(&cfg.db_path)?;
            let filter = db::AdFilter {
                status,
                platform,
                from,
                to,
                multiple_versions,
                limit: Some(limit),
            };
            let rows = db::query(store.conn(), &filter)?;
            if rows.is_empty() {
                println!("No ads found.");
                return Ok(());
            }
            let records: Vec<AdRecord> = rows.into_iter().map(|r| r.record).collect();
            print_ads(&records);
            println!("\n{} ads", records.len());
            Ok(())
        }
        Commands::Stats => {
            let store = db::Store::open(&cfg.db_path)?;
            let s = db::get_stats(store.conn())?;
            println!("Total:             {}", s.total);
            println!("Active:            {}", s.active);
            println!("Inactive:          {}", s.inactive);
            println!("Multiple versions: {}", s.with_multiple_versions);
            if !s.by_platform.is_empty() {
                println!("\n--- Platforms ---");
                for (platform, n) in &s.by_platform {
                    println!("  {:<12} {}", platform, n);
                }
            }
            if !s.by_date.is_empty() {
                println!("\n--- Start dates (latest 30) ---");
                for (date, n) in &s.by_date {
                    println!("  {}  {}", date, n);
                }
            }
            Ok(())
        }
        Commands::Show { id } => {
            let store = db::Store::open(&cfg.db_path)?;
            let Some(ad) = db::get(store.conn(), &id)? else {
                println!("No ad with Library ID {}.", id);
                return Ok(());
            };
            let r = &ad.record;
            println!("Library ID:        {} (row {})", r.id, ad.row_id);
            println!("Status:            {}", r.status);
            println!("Platforms:         {}", platforms_text(r));
            println!("Start date:        {}", date_text(r.start_date));
            println!("End date:          {}", date_text(r.end_date));
            println!("Multiple versions: {}", r.multiple_versions);
            match &r.asset {
                Some(a) => {
                    println!("Asset ({}):     {}", a.kind.as_str(), a.url);
                    println!("Saved to:          {}", a.local_path.as_deref().unwrap_or("-"));
                }
                None => println!("Asset:             -"),
            }
            println!("Scraped at:        {}", r.observed_at.format("%Y-%m-%d %H:%M:%S UTC"));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_session<P: RenderPage>(
    page: P,
    cfg: &Config,
    options: SessionOptions,
    target: usize,
    cancel: CancellationToken,
    store: &mut db::Store,
) -> anyhow::Result<SessionOutcome> {
    let platforms = match &cfg.platform_table {
        Some(path) => PlatformTable::from_json_file(path)?,
        None => PlatformTable::default(),
    };
    info!("Platform table: {} known icon positions", platforms.len());
    let fetcher = AssetFetcher::new(&cfg.assets_dir, cfg.download_timeout())
        .context("Failed to prepare assets directory")?;
    info!("Saving assets under {}", fetcher.root().display());
    let mut session = CollectionSession::new(page, FieldExtractor::new(platforms), fetcher, options)
        .with_cancellation(cancel);
    Ok(session.collect(target, store).await?)
}

/// First Ctrl-C stops the session gracefully.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing with the ads collected so far");
            token.cancel();
        }
    });
    cancel
}

fn stored_records(conn: &rusqlite::Connection) -> anyhow::Result<Vec<AdRecord>> {
    Ok(db::get_all(conn)?.into_iter().map(|a| a.record).collect())
}

fn print_ads(ads: &[AdRecord]) {
    if ads.is_empty() {
        return;
    }
    println!(
        "{:>3} | {:<18} | {:<8} | {:<20} | {:<10} | {:<10} | {:<3} | {:<30}",
        "#", "Library ID", "Status", "Platforms", "Start", "End", "MV", "Asset"
    );
    println!("{}", "-".repeat(120));
    for (i, r) in ads.iter().enumerate() {
        let asset = r
            .local_path()
            .or(r.asset.as_ref().map(|a| a.url.as_str()))
            .unwrap_or("-");
        println!(
            "{:>3} | {:<18} | {:<8} | {:<20} | {:<10} | {:<10} | {:<3} | {:<30}",
            i + 1,
            truncate(&r.id, 18),
            r.status,
            truncate(&platforms_text(r), 20),
            date_text(r.start_date),
            date_text(r.end_date),
            if r.multiple_versions { "yes" } else { "" },
            truncate(asset, 30)
        );
    }
}

fn platforms_text(r: &AdRecord) -> String {
    r.platforms().iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn date_text(d: Option<NaiveDate>) -> String {
    d.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
