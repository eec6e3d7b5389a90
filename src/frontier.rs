//! Frontier watermark: where the previous run left off.
//!
//! The watermark is read from the store once at run start and never mutated
//! mid-run; the next run re-reads it and naturally picks up whatever this run
//! ingested. Equality is on normalized URLs only.

use crate::models::Watermark;
use tracing::debug;
use url::Url;

/// Resolve an href against the page it appeared on, strip the fragment, trim
/// whitespace. Deterministic and idempotent: normalizing a normalized URL is
/// a no-op.
pub fn normalize_url(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href.trim()).ok()?;
    url.set_fragment(None);
    Some(url)
}

#[derive(Debug)]
pub struct Frontier {
    watermark: Option<Watermark>,
}

impl Frontier {
    pub fn new(watermark: Option<Watermark>) -> Self {
        // Stored watermarks are normally written from already-normalized
        // URLs, but rows written by hand (trailing whitespace, fragment)
        // must still match, or every run degrades to the page ceiling.
        let watermark = watermark.map(|mut w| {
            if let Ok(mut url) = Url::parse(w.url.trim()) {
                url.set_fragment(None);
                w.url = String::from(url);
            }
            w
        });
        if let Some(ref w) = watermark {
            debug!(url = %w.url, published_at = ?w.published_at, "Loaded frontier watermark");
        } else {
            debug!("No watermark; bootstrap run");
        }
        Self { watermark }
    }

    /// True when the store was empty at run start. Bootstrap runs have
    /// nothing to converge to and must traverse the full page budget.
    pub fn is_bootstrap(&self) -> bool {
        self.watermark.is_none()
    }

    /// True iff the candidate is the most recently ingested article, meaning
    /// the crawl has caught up to known content.
    pub fn should_stop(&self, candidate: &Url) -> bool {
        self.watermark
            .as_ref()
            .is_some_and(|w| w.url == candidate.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://site/").unwrap()
    }

    #[test]
    fn test_normalize_resolves_and_strips_fragment() {
        let url = normalize_url(&base(), "/path/a#section").unwrap();
        assert_eq!(url.as_str(), "https://site/path/a");
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        let url = normalize_url(&base(), "  /path/a\n").unwrap();
        assert_eq!(url.as_str(), "https://site/path/a");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_url(&base(), "/path/a#x").unwrap();
        let twice = normalize_url(&base(), once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_should_stop_on_exact_watermark_match() {
        let frontier = Frontier::new(Some(Watermark {
            url: "https://site/path/a".to_string(),
            published_at: None,
        }));
        assert!(!frontier.is_bootstrap());
        assert!(frontier.should_stop(&normalize_url(&base(), "/path/a#section").unwrap()));
        assert!(!frontier.should_stop(&normalize_url(&base(), "/path/b").unwrap()));
    }

    #[test]
    fn test_unnormalized_watermark_still_matches() {
        // A row written outside the pipeline may carry a fragment or stray
        // whitespace; the frontier must not silently stop matching.
        let frontier = Frontier::new(Some(Watermark {
            url: " https://site/path/a#comments ".to_string(),
            published_at: None,
        }));
        assert!(frontier.should_stop(&normalize_url(&base(), "/path/a").unwrap()));
    }

    #[test]
    fn test_bootstrap_never_stops() {
        let frontier = Frontier::new(None);
        assert!(frontier.is_bootstrap());
        assert!(!frontier.should_stop(&normalize_url(&base(), "/path/a").unwrap()));
    }
}
