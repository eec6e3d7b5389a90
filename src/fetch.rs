//! Rate-limited, retrying page fetches.
//!
//! The transport sits behind the [`FetchPage`] trait so the pipeline and its
//! tests never care whether a page came from plain HTTP or a script-executing
//! browser; `render_scripts` is the capability switch. The bundled
//! [`HttpFetcher`] is plain reqwest and ignores the switch beyond logging.
//!
//! [`FetchScheduler`] wraps any fetcher with the source site's load budget: a
//! per-domain concurrency cap, a minimum delay between consecutive requests,
//! and bounded exponential backoff with jitter on transient failures. A URL
//! that exhausts its retries surfaces a per-URL error; it never aborts the
//! run.

use rand::{Rng, rng};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("http status {status}")]
    Http { status: u16 },

    /// Rate-limit or anti-scraping signal (429/403). Retrying would make the
    /// situation worse, so these are surfaced immediately.
    #[error("blocked by source site (status {status})")]
    Blocked { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("fetch scheduler shut down")]
    SchedulerClosed,
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Transport(_) => true,
            FetchError::Http { status } => *status >= 500,
            FetchError::Blocked { .. } | FetchError::SchedulerClosed => false,
        }
    }
}

/// What a URL is being fetched as; only affects logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Listing,
    Article,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Listing => "listing",
            PageKind::Article => "article",
        }
    }
}

/// A single page fetch against some transport.
pub trait FetchPage {
    async fn fetch_page(&self, url: &Url, render_scripts: bool) -> Result<String, FetchError>;
}

/// Plain-HTTP [`FetchPage`] implementation.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl FetchPage for HttpFetcher {
    async fn fetch_page(&self, url: &Url, render_scripts: bool) -> Result<String, FetchError> {
        if render_scripts {
            // A browser-backed fetcher would honor this; plain HTTP cannot.
            debug!(%url, "render_scripts requested but unsupported by HttpFetcher");
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 403 {
            return Err(FetchError::Blocked {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(classify_reqwest_error)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

/// Issues fetches under the source site's load budget.
pub struct FetchScheduler<F> {
    fetcher: F,
    domain_limit: Semaphore,
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
    retry_limit: usize,
    base_delay: Duration,
    max_delay: Duration,
    render_scripts: bool,
}

impl<F: FetchPage> FetchScheduler<F> {
    pub fn new(
        fetcher: F,
        concurrency: usize,
        min_delay: Duration,
        retry_limit: usize,
        base_delay: Duration,
        max_delay: Duration,
        render_scripts: bool,
    ) -> Self {
        Self {
            fetcher,
            domain_limit: Semaphore::new(concurrency.max(1)),
            min_delay,
            last_request: Mutex::new(None),
            retry_limit,
            base_delay,
            max_delay,
            render_scripts,
        }
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch one page, retrying transient failures with exponential backoff
    /// and jitter up to the configured attempt limit.
    pub async fn fetch(&self, url: &Url, kind: PageKind) -> Result<String, FetchError> {
        let _permit = self
            .domain_limit
            .acquire()
            .await
            .map_err(|_| FetchError::SchedulerClosed)?;

        let mut attempt = 0usize;
        loop {
            self.pace().await;
            let t0 = Instant::now();
            match self.fetcher.fetch_page(url, self.render_scripts).await {
                Ok(body) => {
                    info!(
                        event = "page.fetched",
                        kind = kind.as_str(),
                        %url,
                        bytes = body.len(),
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        "Fetched page"
                    );
                    return Ok(body);
                }
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || attempt > self.retry_limit {
                        warn!(
                            kind = kind.as_str(),
                            %url,
                            attempt,
                            max = self.retry_limit,
                            error = %e,
                            "Fetch failed permanently"
                        );
                        return Err(e);
                    }

                    let exp = (attempt - 1).min(16) as u32;
                    let mut delay = self.base_delay.saturating_mul(1 << exp);
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        kind = kind.as_str(),
                        %url,
                        attempt,
                        max = self.retry_limit,
                        ?delay,
                        error = %e,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Enforce the minimum gap between consecutive requests to the domain.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                sleep(self.min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
