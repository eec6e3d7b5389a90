//! Normalization and idempotent persistence of extracted articles.
//!
//! The sink owns the last pipeline stage: localize the raw date string into
//! an absolute timestamp, canonicalize tag labels, and commit the article
//! plus its tag associations in one transaction. Ingestion is insert-only at
//! the article level; a URL that already exists is `Skipped` untouched, and
//! any persistence error is `Failed` for that one item only.

use crate::calendar;
use crate::config::DateErrorPolicy;
use crate::extract::ExtractedArticle;
use crate::models::{ArticleCandidate, IngestOutcome};
use crate::store::Store;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Canonical, URL-safe form of a tag label: trimmed, lowercased, whitespace
/// collapsed to single hyphens. Tag *identity* stays the case-sensitive name;
/// the slug is a derived secondary key.
pub fn slugify(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

pub struct Sink {
    store: Arc<Store>,
    month_names: HashMap<String, u32>,
    time_zone: Tz,
    on_date_error: DateErrorPolicy,
}

impl Sink {
    pub fn new(
        store: Arc<Store>,
        month_names: HashMap<String, u32>,
        time_zone: Tz,
        on_date_error: DateErrorPolicy,
    ) -> Self {
        Self {
            store,
            month_names,
            time_zone,
            on_date_error,
        }
    }

    /// Normalize and upsert one extracted article.
    pub fn ingest(&self, url: &Url, fields: &ExtractedArticle) -> IngestOutcome {
        let published_at = match self.localize_date(url, fields.raw_date.as_deref()) {
            Ok(ts) => ts,
            Err(()) => return IngestOutcome::Failed,
        };

        let candidate = ArticleCandidate {
            url: url.clone(),
            title: fields.title.clone().unwrap_or_default(),
            body: fields.body.clone().unwrap_or_default(),
            published_at,
            tags: fields.tags.clone(),
            active: true,
        };
        if fields.degraded {
            warn!(%url, "Ingesting degraded extraction (missing title or body)");
        }

        self.upsert(&candidate)
    }

    /// Parse the raw site date, applying the configured policy when the
    /// calendar rejects it. `Err(())` means the policy said not to ingest.
    fn localize_date(
        &self,
        url: &Url,
        raw_date: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, ()> {
        let Some(raw) = raw_date else {
            warn!(%url, "No date found");
            return Ok(None);
        };

        match calendar::parse_site_date(raw, &self.month_names, self.time_zone) {
            Ok(ts) => Ok(Some(ts)),
            Err(e) => match self.on_date_error {
                DateErrorPolicy::IngestWithoutDate => {
                    warn!(%url, raw, error = %e, "Date conversion failed; ingesting without date");
                    Ok(None)
                }
                DateErrorPolicy::Skip => {
                    warn!(%url, raw, error = %e, "Date conversion failed; skipping article");
                    Err(())
                }
            },
        }
    }

    fn upsert(&self, candidate: &ArticleCandidate) -> IngestOutcome {
        let result = self.store.with_tx(|tx| {
            let (article_id, created) = tx.get_or_create_article(
                candidate.url.as_str(),
                &candidate.title,
                &candidate.body,
                candidate.published_at,
                candidate.active,
            )?;

            if created {
                for label in &candidate.tags {
                    let name = label.trim();
                    if name.is_empty() {
                        continue;
                    }
                    let tag_id = tx.get_or_create_tag(name, &slugify(name))?;
                    tx.associate(article_id, tag_id)?;
                }
            }
            Ok(created)
        });

        match result {
            Ok(true) => {
                info!(
                    event = "article.ingested",
                    outcome = "created",
                    url = %candidate.url,
                    title = %candidate.title,
                    "Created article"
                );
                IngestOutcome::Created
            }
            Ok(false) => {
                debug!(
                    event = "article.ingested",
                    outcome = "skipped",
                    url = %candidate.url,
                    "Skipped existing article"
                );
                IngestOutcome::Skipped
            }
            Err(e) => {
                error!(
                    event = "article.ingested",
                    outcome = "failed",
                    url = %candidate.url,
                    error = %e,
                    "Failed to persist article"
                );
                IngestOutcome::Failed
            }
        }
    }
}
