//! Page-by-page traversal of the archive listing.
//!
//! The paginator is a small state machine driven by the run loop: it never
//! fetches anything itself, it only decides which links from a fetched
//! listing page become article fetches and whether another listing page
//! should be requested.
//!
//! The frontier stop decision is page-boundary-scoped: it is made while
//! walking a page's full link set in document order, and once it fires the
//! rest of that page is discarded and no further listing page is requested.
//! Article fetches already scheduled from earlier links are left to drain.

use crate::config::CompiledRules;
use crate::extract::{self, ExtractError};
use crate::frontier::{Frontier, normalize_url};
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Waiting on the listing fetch for this 1-based page number.
    Listing(u32),
    StoppedByFrontier,
    StoppedByMaxPages,
    /// All stop conditions met and all scheduled work drained.
    Done,
}

pub struct Paginator {
    state: PageState,
    max_pages: u32,
    link_selector: Selector,
    /// URLs already scheduled this run; archive pages repeat links across
    /// widgets and adjacent pages.
    scheduled: HashSet<Url>,
}

impl Paginator {
    pub fn new(listing_link_selectors: &[String], max_pages: u32) -> Result<Self, ExtractError> {
        // One comma-joined selector keeps matches in document order across
        // all configured variants.
        extract::parse_selectors(listing_link_selectors)?;
        let combined = listing_link_selectors.join(", ");
        let link_selector = Selector::parse(&combined)
            .map_err(|_| ExtractError::BadSelector(combined.clone()))?;

        Ok(Self {
            state: PageState::Listing(1),
            max_pages,
            link_selector,
            scheduled: HashSet::new(),
        })
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Page number to fetch next, if pagination is still running.
    pub fn current_page(&self) -> Option<u32> {
        match self.state {
            PageState::Listing(n) => Some(n),
            _ => None,
        }
    }

    /// Consume one fetched listing page: walk its links in document order,
    /// decide stop-or-continue, and return the article URLs to schedule.
    pub fn process_listing(
        &mut self,
        html: &str,
        page_url: &Url,
        frontier: &Frontier,
        rules: &CompiledRules,
    ) -> Vec<Url> {
        let PageState::Listing(page) = self.state else {
            return Vec::new();
        };

        let document = Html::parse_document(html);
        let mut to_schedule = Vec::new();

        for element in document.select(&self.link_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(url) = normalize_url(page_url, href) else {
                debug!(href, "Discarding unresolvable link");
                continue;
            };

            if frontier.should_stop(&url) {
                info!(
                    page,
                    watermark = %url,
                    already_scheduled = to_schedule.len(),
                    "Reached frontier; stopping pagination"
                );
                self.state = PageState::StoppedByFrontier;
                return to_schedule;
            }

            if rules.is_article_url(url.as_str()) && self.scheduled.insert(url.clone()) {
                to_schedule.push(url);
            }
        }

        if page < self.max_pages {
            self.state = PageState::Listing(page + 1);
        } else {
            info!(page, max_pages = self.max_pages, "Reached page ceiling");
            self.state = PageState::StoppedByMaxPages;
        }
        to_schedule
    }

    /// Mark all in-flight article fetches drained. Only meaningful from a
    /// stop state.
    pub fn finish(&mut self) {
        if matches!(
            self.state,
            PageState::StoppedByFrontier | PageState::StoppedByMaxPages
        ) {
            self.state = PageState::Done;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Watermark;

    fn paginator(max_pages: u32) -> Paginator {
        Paginator::new(&Config::default().listing_link_selectors, max_pages).unwrap()
    }

    fn rules() -> CompiledRules {
        Config::default().compile().unwrap()
    }

    fn page_url() -> Url {
        Url::parse("https://www.zoomit.ir/archive/?page=1").unwrap()
    }

    fn listing(links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|href| format!("<article><a href=\"{href}\">x</a></article>"))
            .collect();
        format!("<html><body>{anchors}</body></html>")
    }

    #[test]
    fn test_article_links_are_scheduled_in_order() {
        let mut p = paginator(5);
        let html = listing(&[
            "/mobile/11111-first/",
            "/contact-us/",
            "/mobile/22222-second/",
        ]);
        let urls = p.process_listing(&html, &page_url(), &Frontier::new(None), &rules());
        assert_eq!(
            urls.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec![
                "https://www.zoomit.ir/mobile/11111-first/",
                "https://www.zoomit.ir/mobile/22222-second/",
            ]
        );
        assert_eq!(p.state(), PageState::Listing(2));
    }

    #[test]
    fn test_duplicate_links_scheduled_once() {
        let mut p = paginator(5);
        let html = listing(&["/mobile/11111-a/", "/mobile/11111-a/#comments"]);
        let urls = p.process_listing(&html, &page_url(), &Frontier::new(None), &rules());
        assert_eq!(urls.len(), 1);

        // Repeats on a later page are also skipped.
        let urls = p.process_listing(&html, &page_url(), &Frontier::new(None), &rules());
        assert!(urls.is_empty());
    }

    #[test]
    fn test_deny_listed_links_never_schedule() {
        let mut p = paginator(5);
        let html = listing(&["/video/33333-clip/"]);
        let mut config = Config::default();
        config.article_url_pattern = r"^https://www\.zoomit\.ir/.+/\d{5,}-[^/]+/?$".to_string();
        let urls = p.process_listing(
            &html,
            &page_url(),
            &Frontier::new(None),
            &config.compile().unwrap(),
        );
        assert!(urls.is_empty());
    }

    #[test]
    fn test_frontier_stop_discards_rest_of_page() {
        let mut p = paginator(5);
        let frontier = Frontier::new(Some(Watermark {
            url: "https://www.zoomit.ir/mobile/22222-watermark/".to_string(),
            published_at: None,
        }));
        let html = listing(&[
            "/mobile/11111-before/",
            "/mobile/22222-watermark/",
            "/mobile/33333-after/",
        ]);

        let urls = p.process_listing(&html, &page_url(), &frontier, &rules());
        // The link before the watermark stays scheduled; the one after is
        // discarded with the rest of the page.
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "https://www.zoomit.ir/mobile/11111-before/");
        assert_eq!(p.state(), PageState::StoppedByFrontier);

        p.finish();
        assert_eq!(p.state(), PageState::Done);
    }

    #[test]
    fn test_max_pages_stops_pagination() {
        let mut p = paginator(2);
        let html = listing(&["/mobile/11111-a/"]);
        p.process_listing(&html, &page_url(), &Frontier::new(None), &rules());
        assert_eq!(p.state(), PageState::Listing(2));
        p.process_listing(&html, &page_url(), &Frontier::new(None), &rules());
        assert_eq!(p.state(), PageState::StoppedByMaxPages);
        assert_eq!(p.current_page(), None);
    }

    #[test]
    fn test_empty_page_continues_pagination() {
        let mut p = paginator(3);
        let urls = p.process_listing(
            &listing(&[]),
            &page_url(),
            &Frontier::new(None),
            &rules(),
        );
        assert!(urls.is_empty());
        assert_eq!(p.state(), PageState::Listing(2));
    }
}
