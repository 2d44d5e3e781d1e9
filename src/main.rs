use crate::browser::ChromeSession;
use crate::config::{Cli, Command, CrawlArgs, CrawlConfig};
use crate::crawler::{CrawlPlan, RunController};
use crate::db::{export_json, DedupStore, SqliteStore};
use crate::domain::{RunSummary, StopReason};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod browser;
mod config;
mod crawler;
mod db;
mod domain;
mod errors;
mod normalize;
mod scraper;

#[cfg(test)]
mod tests;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Command::Crawl(args) => crawl(&cli.db, args),
        Command::Export { output } => export(&cli.db, output),
        Command::Runs { limit } => runs(&cli.db, *limit),
    }
}

fn crawl(db_path: &Path, args: &CrawlArgs) -> Result<()> {
    let config = CrawlConfig::from_args(args).context("Invalid crawl configuration")?;
    let plan = CrawlPlan::from_config(&config).context("Could not prepare the crawl")?;

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Could not install the Ctrl-C handler")?;

    let store = match SqliteStore::open(db_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Database unavailable: {e}");
            return emit(&startup_failure(StopReason::StoreUnavailable));
        }
    };

    match store.count() {
        Ok(stored) => info!(stored, "Listings already in the store"),
        Err(e) => warn!("Could not count stored listings: {e}"),
    }

    let launch = config.launch_options();
    let session = match ChromeSession::launch(&launch) {
        Ok(session) => session,
        Err(e) => {
            error!(executable = ?launch.executable, "Could not start the browser: {e}");
            if let Err(e) = store.close() {
                warn!("Store did not close cleanly: {e}");
            }
            return emit(&startup_failure(StopReason::StartFailed));
        }
    };

    info!(
        layout = config.profile.layout.as_str(),
        budget_secs = config.budget.as_secs(),
        start_page = config.start_page,
        max_pages = config.max_pages,
        "Starting crawl"
    );
    let summary = RunController::new(plan, session, store)
        .with_interrupt(interrupt)
        .run();
    emit(&summary)
}

fn startup_failure(reason: StopReason) -> RunSummary {
    RunSummary {
        pages_visited: 0,
        listings_inserted: 0,
        listings_skipped: 0,
        stop_reason: reason,
    }
}

fn emit(summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Could not encode run summary")?;
    println!("{json}");
    Ok(())
}

fn export(db_path: &Path, output: &Path) -> Result<()> {
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("Could not open {}", db_path.display()))?;
    let count = export_json(&store, output)
        .with_context(|| format!("Could not write {}", output.display()))?;
    info!(count, path = %output.display(), "Exported listings");
    Ok(())
}

fn runs(db_path: &Path, limit: u32) -> Result<()> {
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("Could not open {}", db_path.display()))?;
    let runs = store.recent_runs(limit).context("Could not read crawl runs")?;
    let json = serde_json::to_string_pretty(&runs).context("Could not encode crawl runs")?;
    println!("{json}");
    Ok(())
}
