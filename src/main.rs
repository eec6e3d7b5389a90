//! # taknews
//!
//! Incremental crawler for a paginated news archive. Each run walks the
//! archive listing page by page, stops as soon as it reaches content the
//! previous run already ingested, extracts structured fields from every new
//! article, converts the site's Jalali publish dates to absolute UTC
//! timestamps, and upserts articles plus tags into SQLite exactly once.
//!
//! ## Usage
//!
//! ```sh
//! taknews -c ./taknews.yaml -d ./taknews.db
//! ```
//!
//! ## Architecture
//!
//! The run is a pipeline:
//! 1. **Pagination**: listing pages are fetched in order until the frontier
//!    watermark, the page ceiling, or the end of the archive
//! 2. **Fetching**: discovered article URLs are downloaded under per-domain
//!    concurrency and delay limits, with retry/backoff on transient failures
//! 3. **Extraction**: configured selector lists pull title, body, date, and
//!    tags out of each page
//! 4. **Ingestion**: one transaction per article; re-runs skip, never
//!    duplicate

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod calendar;
mod cli;
mod config;
mod extract;
mod fetch;
mod frontier;
mod ingest;
mod models;
mod paginate;
mod run;
mod store;

use cli::Cli;
use config::Config;
use fetch::HttpFetcher;
use models::RunState;
use run::Crawl;
use store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("taknews starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.database, ?args.max_pages, "Parsed CLI arguments");

    let mut config = match args.config.as_deref() {
        Some(path) => match Config::load(path) {
            Ok(config) => {
                info!(path, "Loaded configuration");
                config
            }
            Err(e) => return fatal(Box::new(e)),
        },
        None => {
            info!("No config file given; using defaults");
            Config::default()
        }
    };
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(max_pages) = args.max_pages {
        config.max_pages = max_pages;
    }
    if args.run_timeout_secs.is_some() {
        config.run_timeout_secs = args.run_timeout_secs;
    }

    // Store unreachable at startup is the one non-config fatal condition:
    // without it there is no watermark and nowhere to ingest.
    let store = match Store::open(&config.database_path) {
        Ok(store) => Arc::new(store),
        Err(e) => return fatal(Box::new(e)),
    };
    info!(path = %config.database_path, "Opened article store");

    let fetcher = match HttpFetcher::new(
        &config.user_agent,
        Duration::from_secs(config.request_timeout_secs),
    ) {
        Ok(fetcher) => fetcher,
        Err(e) => return fatal(Box::new(e)),
    };

    let crawl = match Crawl::new(config, store, fetcher) {
        Ok(crawl) => crawl,
        Err(e) => return fatal(Box::new(e)),
    };

    let report = crawl.run().await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        state = report.state.as_str(),
        pages_visited = report.pages_visited,
        created = report.created,
        skipped = report.skipped,
        failed = report.failed,
        "Execution complete"
    );

    Ok(())
}

/// Log a startup failure as the run's terminal outcome and bubble it up.
fn fatal(e: Box<dyn Error>) -> Result<(), Box<dyn Error>> {
    error!(
        event = "run.completed",
        state = RunState::AbortedFatal.as_str(),
        error = %e,
        "Run aborted before crawling"
    );
    Err(e)
}
