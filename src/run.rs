//! One crawl run, end to end.
//!
//! Listing pages are fetched strictly in increasing page order; the article
//! URLs they yield are then processed by a bounded worker pool
//! (`buffer_unordered`), each worker carrying one article through
//! fetch, extract, date conversion, and ingestion. Per-article failures are
//! isolated: one bad page never aborts the run.
//!
//! A run's only inputs beyond config are store connectivity (for the
//! watermark) and the fetch capability; its only outputs are store mutations
//! and the structured `run.completed` event.

use crate::config::{Config, ConfigError};
use crate::extract::{ExtractError, Extractor};
use crate::fetch::{FetchPage, FetchScheduler, PageKind};
use crate::frontier::Frontier;
use crate::ingest::Sink;
use crate::models::{IngestOutcome, RunReport, RunState};
use crate::paginate::{PageState, Paginator};
use crate::store::{Store, StoreError};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

/// Failures that abort the run before any page is fetched.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Default)]
struct RunCounters {
    pages: AtomicUsize,
    created: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl RunCounters {
    fn record(&self, outcome: IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Created => &self.created,
            IngestOutcome::Skipped => &self.skipped,
            IngestOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Crawl<F> {
    config: Config,
    rules: crate::config::CompiledRules,
    scheduler: FetchScheduler<F>,
    extractor: Extractor,
    frontier: Frontier,
    sink: Sink,
}

impl<F: FetchPage> Crawl<F> {
    /// Wire up one run. The watermark is read here, once; it stays immutable
    /// for the whole run.
    pub fn new(config: Config, store: Arc<Store>, fetcher: F) -> Result<Self, SetupError> {
        let rules = config.compile()?;
        let extractor = Extractor::new(&config.selectors)?;
        // Validates the listing selectors up front so the crawl loop cannot
        // fail on them later.
        Paginator::new(&config.listing_link_selectors, config.max_pages)?;

        let frontier = Frontier::new(store.latest_article()?);
        let sink = Sink::new(
            Arc::clone(&store),
            config.month_names.clone(),
            rules.time_zone,
            config.on_date_error,
        );
        let scheduler = FetchScheduler::new(
            fetcher,
            config.concurrent_requests_per_domain,
            Duration::from_millis(config.download_delay_ms),
            config.retry_limit,
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
            config.render_scripts,
        );

        Ok(Self {
            config,
            rules,
            scheduler,
            extractor,
            frontier,
            sink,
        })
    }

    pub async fn run(&self) -> RunReport {
        let counters = RunCounters::default();

        let state = match self.config.run_timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), self.crawl(&counters)).await
                {
                    Ok(state) => state,
                    Err(_) => {
                        warn!(timeout_secs = secs, "Run timed out; abandoning in-flight fetches");
                        RunState::Cancelled
                    }
                }
            }
            None => self.crawl(&counters).await,
        };

        let report = RunReport {
            state,
            pages_visited: counters.pages.load(Ordering::Relaxed),
            created: counters.created.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        };
        info!(
            event = "run.completed",
            state = report.state.as_str(),
            pages_visited = report.pages_visited,
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            "Crawl run finished"
        );
        report
    }

    async fn crawl(&self, counters: &RunCounters) -> RunState {
        let mut paginator =
            match Paginator::new(&self.config.listing_link_selectors, self.config.max_pages) {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, "Invalid listing selectors");
                    return RunState::AbortedFatal;
                }
            };

        if self.frontier.is_bootstrap() {
            info!(
                max_pages = self.config.max_pages,
                "Empty store; bootstrap run over the full page budget"
            );
        }

        // Listing traversal is inherently sequential: page N+1 is only
        // requested once page N's full link set is known.
        let mut article_urls: Vec<Url> = Vec::new();
        let mut archive_exhausted = false;
        while let Some(page) = paginator.current_page() {
            let raw = self.config.listing_page_url(page);
            let Ok(page_url) = Url::parse(&raw) else {
                error!(url = %raw, "Listing URL template produced an unparseable URL");
                return RunState::AbortedFatal;
            };

            match self.scheduler.fetch(&page_url, PageKind::Listing).await {
                Ok(html) => {
                    counters.pages.fetch_add(1, Ordering::Relaxed);
                    let scheduled =
                        paginator.process_listing(&html, &page_url, &self.frontier, &self.rules);
                    info!(page, scheduled = scheduled.len(), "Processed listing page");
                    article_urls.extend(scheduled);
                }
                Err(e) => {
                    // The archive ran out (or the page is gone); everything
                    // discovered so far still gets processed.
                    warn!(page, error = %e, "Listing page unreachable; ending pagination");
                    archive_exhausted = true;
                    break;
                }
            }
        }

        let end_state = if archive_exhausted {
            RunState::Completed
        } else {
            match paginator.state() {
                PageState::StoppedByFrontier => RunState::StoppedByFrontier,
                PageState::StoppedByMaxPages => RunState::StoppedByMaxPages,
                // current_page() returned None, so only stop states remain.
                PageState::Listing(_) | PageState::Done => RunState::Completed,
            }
        };

        // Drain all scheduled article fetches; ingestion is commutative, so
        // completion order does not matter. Each outcome is counted the
        // moment its article finishes: a run timeout drops this future, and
        // work already committed must still show up in the summary.
        stream::iter(article_urls)
            .map(|url| async move { self.process_article(url).await })
            .buffer_unordered(self.config.concurrent_requests_per_domain.max(1))
            .for_each(|outcome| async move {
                counters.record(outcome);
            })
            .await;
        paginator.finish();

        end_state
    }

    async fn process_article(&self, url: Url) -> IngestOutcome {
        let html = match self.scheduler.fetch(&url, PageKind::Article).await {
            Ok(html) => html,
            Err(e) => {
                warn!(%url, error = %e, "Article fetch failed");
                return IngestOutcome::Failed;
            }
        };

        match self.extractor.extract(&html) {
            Ok(fields) => self.sink.ingest(&url, &fields),
            Err(e) => {
                warn!(%url, error = %e, "Extraction incomplete; skipping article");
                IngestOutcome::Failed
            }
        }
    }
}
