//! Core data structures shared across the pipeline.
//!
//! An article moves through the pipeline as an [`ArticleCandidate`]: built in
//! memory by the extractor, dated by the calendar converter, and consumed
//! exactly once by the ingestion sink. Durable article state lives in the
//! store, never here.

use chrono::{DateTime, Utc};
use url::Url;

/// An article candidate assembled from one fetched page.
///
/// Identity is the (normalized) source URL: two candidates with the same URL
/// are the same logical article. `published_at` is `None` when the page
/// carried no parseable date; that is a valid, recoverable state.
#[derive(Debug, Clone)]
pub struct ArticleCandidate {
    /// Normalized source URL; the article's identity in the store.
    pub url: Url,
    pub title: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Raw tag labels exactly as they appeared on the page.
    pub tags: Vec<String>,
    pub active: bool,
}

/// The "last known ingested article" boundary, read once at run start and
/// immutable for the duration of the run.
#[derive(Debug, Clone)]
pub struct Watermark {
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Outcome of ingesting one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new article row (and its tag associations) was committed.
    Created,
    /// The URL already existed; nothing was written.
    Skipped,
    /// Extraction, fetching, or persistence failed for this one item.
    Failed,
}

/// How the run's pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The archive ran out of listing pages before any other stop condition.
    Completed,
    /// A discovered link matched the stored watermark.
    StoppedByFrontier,
    /// The configured per-run page ceiling was reached.
    StoppedByMaxPages,
    /// The run-level timeout fired; in-flight work was abandoned.
    Cancelled,
    /// Store or configuration failure at startup.
    AbortedFatal,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Completed => "completed",
            RunState::StoppedByFrontier => "stopped_by_frontier",
            RunState::StoppedByMaxPages => "stopped_by_max_pages",
            RunState::Cancelled => "cancelled",
            RunState::AbortedFatal => "aborted_fatal",
        }
    }
}

/// Summary of one crawl run, logged as the `run.completed` event.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub pages_visited: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}
