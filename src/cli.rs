//! Command-line interface definitions.
//!
//! A run needs nothing beyond store connectivity: all site-specific behavior
//! lives in the YAML config file, and the flags here are operational
//! overrides. Everything can also be supplied via environment variables, so
//! the binary drops into cron or a task queue unchanged.

use clap::Parser;

/// Command-line arguments for the taknews crawler.
///
/// # Examples
///
/// ```sh
/// # Run against the defaults with a local database
/// taknews -d ./taknews.db
///
/// # Full config file, capped at two archive pages
/// taknews -c ./taknews.yaml --max-pages 2
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML config file (defaults apply when omitted)
    #[arg(short, long, env = "TAKNEWS_CONFIG")]
    pub config: Option<String>,

    /// SQLite database path (overrides the config file)
    #[arg(short, long, env = "TAKNEWS_DATABASE")]
    pub database: Option<String>,

    /// Maximum archive pages for this run (overrides the config file)
    #[arg(long, env = "TAKNEWS_MAX_PAGES")]
    pub max_pages: Option<u32>,

    /// Abandon the run after this many seconds (overrides the config file)
    #[arg(long, env = "TAKNEWS_RUN_TIMEOUT")]
    pub run_timeout_secs: Option<u64>,
}
