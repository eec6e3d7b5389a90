//! Selector-driven extraction of article fields from raw markup.
//!
//! Site markup is the fragile end of the pipeline, so nothing structural is
//! hard-coded: each field gets an ordered list of selectors from config and
//! the first one that matches wins. A redesign means prepending a selector,
//! not shipping code.
//!
//! Missing title or body degrades the result instead of failing it; the only
//! extraction error is a page where no root container matches at all, since
//! then no field can be attributed reliably.

use crate::config::SelectorConfig;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// No configured root selector matched; nothing on the page can be
    /// anchored to an article.
    #[error("no root article container matched")]
    RootMissing,

    /// A selector string in config failed to parse. Detected at construction,
    /// never at extract time.
    #[error("invalid selector `{0}`")]
    BadSelector(String),
}

/// Fields pulled from one article page. `degraded` marks a partial result
/// (missing title or body) that is still worth attempting to ingest.
#[derive(Debug, Clone, Default)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub body: Option<String>,
    /// Publish date exactly as rendered; parsed by the calendar module.
    pub raw_date: Option<String>,
    pub tags: Vec<String>,
    pub degraded: bool,
}

pub struct Extractor {
    root: Vec<Selector>,
    title: Vec<Selector>,
    body: Vec<Selector>,
    date: Vec<Selector>,
    tags: Vec<Selector>,
}

impl Extractor {
    pub fn new(config: &SelectorConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            root: parse_selectors(&config.root)?,
            title: parse_selectors(&config.title)?,
            body: parse_selectors(&config.body)?,
            date: parse_selectors(&config.date)?,
            tags: parse_selectors(&config.tags)?,
        })
    }

    pub fn extract(&self, html: &str) -> Result<ExtractedArticle, ExtractError> {
        let document = Html::parse_document(html);
        let root = first_match(document.root_element(), &self.root)
            .ok_or(ExtractError::RootMissing)?;

        let title = first_match(root, &self.title)
            .map(element_text)
            .filter(|t| !t.is_empty());

        let body = first_match(root, &self.body)
            .map(body_text)
            .filter(|b| !b.is_empty());

        let raw_date = first_match(root, &self.date)
            .map(element_text)
            .filter(|d| !d.is_empty());

        let tags = self
            .tags
            .iter()
            .map(|sel| {
                root.select(sel)
                    .map(element_text)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        let degraded = title.is_none() || body.is_none();
        Ok(ExtractedArticle {
            title,
            body,
            raw_date,
            tags,
            degraded,
        })
    }
}

pub(crate) fn parse_selectors(list: &[String]) -> Result<Vec<Selector>, ExtractError> {
    list.iter()
        .map(|s| Selector::parse(s).map_err(|_| ExtractError::BadSelector(s.clone())))
        .collect()
}

fn first_match<'a>(scope: ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|sel| scope.select(sel).next())
}

/// Flatten an element's text into one cleaned line.
fn element_text(el: ElementRef<'_>) -> String {
    clean_fragment(&el.text().collect::<Vec<_>>().join(" "))
}

/// Concatenate every descendant text node: trim each fragment, drop the
/// zero-width joiner/non-joiner characters the site scatters through Persian
/// text, skip empties, join with a single newline.
fn body_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(clean_fragment)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_fragment(t: &str) -> String {
    t.replace(['\u{200c}', '\u{200d}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;

    fn extractor() -> Extractor {
        let config = SelectorConfig {
            root: vec!["article".to_string(), "main".to_string()],
            title: vec!["h1".to_string()],
            body: vec![".missing-first".to_string(), ".article-body".to_string()],
            date: vec![".publish-date".to_string()],
            tags: vec![".tags a span".to_string()],
        };
        Extractor::new(&config).unwrap()
    }

    const PAGE: &str = r#"
        <html><body>
          <article>
            <h1> Galaxy S25 review </h1>
            <span class="publish-date"> ۱ فروردین ۱۴۰۲ - ۱۰:۳۰ </span>
            <div class="article-body">
              <p>First paragraph.</p>
              <p><b>Bold</b> fragment</p>
              <p>  </p>
              <p>می‌رسد</p>
            </div>
            <div class="tags">
              <a href="/tag/mobile"><span>Mobile</span></a>
              <a href="/tag/samsung"><span>Samsung</span></a>
            </div>
          </article>
        </body></html>"#;

    #[test]
    fn test_full_extraction() {
        let article = extractor().extract(PAGE).unwrap();
        assert_eq!(article.title.as_deref(), Some("Galaxy S25 review"));
        assert_eq!(
            article.body.as_deref(),
            Some("First paragraph.\nBold\nfragment\nمیرسد")
        );
        assert_eq!(article.raw_date.as_deref(), Some("۱ فروردین ۱۴۰۲ - ۱۰:۳۰"));
        assert_eq!(article.tags, vec!["Mobile", "Samsung"]);
        assert!(!article.degraded);
    }

    #[test]
    fn test_second_body_selector_wins_when_first_misses() {
        // `.missing-first` matches nothing; extraction falls through to
        // `.article-body` without degrading.
        let article = extractor().extract(PAGE).unwrap();
        assert!(article.body.is_some());
        assert!(!article.degraded);
    }

    #[test]
    fn test_missing_title_degrades() {
        let page = r#"<article><div class="article-body"><p>Text</p></div></article>"#;
        let article = extractor().extract(page).unwrap();
        assert!(article.title.is_none());
        assert_eq!(article.body.as_deref(), Some("Text"));
        assert!(article.degraded);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let page = r#"<html><body><div><h1>Not an article</h1></div></body></html>"#;
        assert!(matches!(
            extractor().extract(page),
            Err(ExtractError::RootMissing)
        ));
    }

    #[test]
    fn test_root_fallback_to_main() {
        let page = r#"<main><h1>Title</h1><div class="article-body">Body</div></main>"#;
        let article = extractor().extract(page).unwrap();
        assert_eq!(article.title.as_deref(), Some("Title"));
        assert!(!article.degraded);
    }

    #[test]
    fn test_bad_selector_fails_construction() {
        let config = SelectorConfig {
            root: vec!["article".to_string()],
            title: vec!["h1[".to_string()],
            body: vec!["div".to_string()],
            date: vec!["time".to_string()],
            tags: vec!["a".to_string()],
        };
        assert!(matches!(
            Extractor::new(&config),
            Err(ExtractError::BadSelector(_))
        ));
    }

    #[test]
    fn test_no_tags_is_empty_not_error() {
        let page = r#"<article><h1>T</h1><div class="article-body">B</div></article>"#;
        let article = extractor().extract(page).unwrap();
        assert!(article.tags.is_empty());
    }
}
