//! Runtime configuration loaded from a YAML file.
//!
//! Everything site-specific lives here rather than in code: the archive URL
//! template, the article URL shape, the deny list, the ordered selector lists
//! per field, and the locale month-name table. Defaults target zoomit.ir so
//! the binary runs with an empty config file; any other archive of the same
//! shape is a config change, not a code change.
//!
//! Validation happens once at startup and is run-fatal: a crawl with an empty
//! selector list or an unparseable regex has no sane degraded mode.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Configuration problems detected at load time. All of these abort the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("archive_url_template must contain a {{page}} placeholder")]
    MissingPagePlaceholder,

    #[error("selector list `{0}` is empty")]
    EmptySelectorList(&'static str),

    #[error("month_names must have exactly 12 entries, got {0}")]
    BadMonthTable(usize),

    #[error("unknown time zone: {0}")]
    BadTimeZone(String),

    #[error("invalid regex `{pattern}`: {source}")]
    BadRegex {
        pattern: String,
        source: regex::Error,
    },

    #[error("max_pages must be at least 1")]
    ZeroMaxPages,
}

/// What to do with an article whose date string failed calendar conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateErrorPolicy {
    /// Ingest the article with `published_at` NULL.
    IngestWithoutDate,
    /// Do not ingest; count the article as failed.
    Skip,
}

/// Ordered selector lists, one per extracted field. First match wins, so
/// older selectors can stay in the list as fallbacks across site redesigns.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorConfig {
    /// Anchors all extraction; if nothing here matches, the page is rejected.
    #[serde(default = "default_root_selectors")]
    pub root: Vec<String>,
    #[serde(default = "default_title_selectors")]
    pub title: Vec<String>,
    #[serde(default = "default_body_selectors")]
    pub body: Vec<String>,
    #[serde(default = "default_date_selectors")]
    pub date: Vec<String>,
    #[serde(default = "default_tag_selectors")]
    pub tags: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            root: default_root_selectors(),
            title: default_title_selectors(),
            body: default_body_selectors(),
            date: default_date_selectors(),
            tags: default_tag_selectors(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listing page URL template; `{page}` is replaced with the 1-based page
    /// number.
    #[serde(default = "default_archive_url_template")]
    pub archive_url_template: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum concurrent in-flight requests against the source domain.
    #[serde(default = "default_concurrency")]
    pub concurrent_requests_per_domain: usize,

    /// Minimum delay between consecutive requests to the source domain.
    #[serde(default = "default_download_delay_ms")]
    pub download_delay_ms: u64,

    /// Per-request timeout before the fetch counts as failed (and retryable).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Hard ceiling on listing pages per run; also the bootstrap traversal
    /// depth when the store is empty.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_retry_limit")]
    pub retry_limit: usize,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Links must match this to be scheduled as article fetches.
    #[serde(default = "default_article_url_pattern")]
    pub article_url_pattern: String,

    /// Links matching any of these are never scheduled, even when they also
    /// match the article shape.
    #[serde(default = "default_deny_patterns")]
    pub deny_patterns: Vec<String>,

    /// Selectors used on listing pages to find outbound article links.
    #[serde(default = "default_listing_link_selectors")]
    pub listing_link_selectors: Vec<String>,

    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Source-locale month name to month number, exactly 12 entries.
    #[serde(default = "default_month_names")]
    pub month_names: HashMap<String, u32>,

    /// IANA zone the site's wall-clock dates are expressed in.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    #[serde(default = "default_date_error_policy")]
    pub on_date_error: DateErrorPolicy,

    /// Whether the fetch capability should execute client-side scripts.
    #[serde(default)]
    pub render_scripts: bool,

    /// Abandon all in-flight work and end the run after this many seconds.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,

    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_url_template: default_archive_url_template(),
            user_agent: default_user_agent(),
            concurrent_requests_per_domain: default_concurrency(),
            download_delay_ms: default_download_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_pages: default_max_pages(),
            retry_limit: default_retry_limit(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            article_url_pattern: default_article_url_pattern(),
            deny_patterns: default_deny_patterns(),
            listing_link_selectors: default_listing_link_selectors(),
            selectors: SelectorConfig::default(),
            month_names: default_month_names(),
            time_zone: default_time_zone(),
            on_date_error: default_date_error_policy(),
            render_scripts: false,
            run_timeout_secs: None,
            database_path: default_database_path(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Validate the fields the pipeline cannot limp along without and compile
    /// the derived pieces (regexes, zone). Call once at startup.
    pub fn compile(&self) -> Result<CompiledRules, ConfigError> {
        if !self.archive_url_template.contains("{page}") {
            return Err(ConfigError::MissingPagePlaceholder);
        }
        if self.max_pages == 0 {
            return Err(ConfigError::ZeroMaxPages);
        }
        for (name, list) in [
            ("listing_link_selectors", &self.listing_link_selectors),
            ("selectors.root", &self.selectors.root),
            ("selectors.title", &self.selectors.title),
            ("selectors.body", &self.selectors.body),
            ("selectors.date", &self.selectors.date),
            ("selectors.tags", &self.selectors.tags),
        ] {
            if list.is_empty() {
                return Err(ConfigError::EmptySelectorList(name));
            }
        }
        if self.month_names.len() != 12 {
            return Err(ConfigError::BadMonthTable(self.month_names.len()));
        }

        let time_zone: chrono_tz::Tz = self
            .time_zone
            .parse()
            .map_err(|_| ConfigError::BadTimeZone(self.time_zone.clone()))?;

        let article_url = compile_regex(&self.article_url_pattern)?;
        let deny = self
            .deny_patterns
            .iter()
            .map(|p| compile_regex(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledRules {
            article_url,
            deny,
            time_zone,
        })
    }

    pub fn listing_page_url(&self, page: u32) -> String {
        self.archive_url_template.replace("{page}", &page.to_string())
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::BadRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Pieces of [`Config`] that need a fallible compilation step.
#[derive(Debug)]
pub struct CompiledRules {
    pub article_url: Regex,
    pub deny: Vec<Regex>,
    pub time_zone: chrono_tz::Tz,
}

impl CompiledRules {
    /// Article-shape test: matches the allow pattern and none of the denies.
    pub fn is_article_url(&self, url: &str) -> bool {
        self.article_url.is_match(url) && !self.deny.iter().any(|d| d.is_match(url))
    }
}

fn default_archive_url_template() -> String {
    "https://www.zoomit.ir/archive/?page={page}".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_download_delay_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_max_pages() -> u32 {
    10
}

fn default_retry_limit() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_article_url_pattern() -> String {
    // Section path segment, a numeric id of at least five digits, then a slug.
    r"^https://www\.zoomit\.ir/[a-z0-9-]+/\d{5,}-[^/]+/?$".to_string()
}

fn default_deny_patterns() -> Vec<String> {
    [
        "/search/",
        "/profile/",
        "/video/",
        "/about-us/",
        "/advertisement/",
        "/hire/",
        "/contact-us/",
        "/community-guidelines/",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_listing_link_selectors() -> Vec<String> {
    vec![
        "article a[href]".to_string(),
        ".article-card a[href]".to_string(),
        ".news-item a[href]".to_string(),
    ]
}

fn default_root_selectors() -> Vec<String> {
    vec!["main article".to_string(), "article".to_string(), "main".to_string()]
}

fn default_title_selectors() -> Vec<String> {
    vec!["h1".to_string()]
}

fn default_body_selectors() -> Vec<String> {
    vec![
        // Obfuscated class names from the current site build; keep older ones
        // behind them as the site redesigns.
        "div.sc-481293f7-1.jrhnOU".to_string(),
        "div[class*=\"article-body\"]".to_string(),
    ]
}

fn default_date_selectors() -> Vec<String> {
    vec!["span[class*=\"fa\"]".to_string(), "time".to_string()]
}

fn default_tag_selectors() -> Vec<String> {
    vec![
        "div.sc-a11b1542-0.fCUOzW a span".to_string(),
        "a[href*=\"/tag/\"]".to_string(),
    ]
}

fn default_month_names() -> HashMap<String, u32> {
    [
        ("فروردین", 1),
        ("اردیبهشت", 2),
        ("خرداد", 3),
        ("تیر", 4),
        ("مرداد", 5),
        ("شهریور", 6),
        ("مهر", 7),
        ("آبان", 8),
        ("آذر", 9),
        ("دی", 10),
        ("بهمن", 11),
        ("اسفند", 12),
    ]
    .into_iter()
    .map(|(name, n)| (name.to_string(), n))
    .collect()
}

fn default_time_zone() -> String {
    "Asia/Tehran".to_string()
}

fn default_date_error_policy() -> DateErrorPolicy {
    DateErrorPolicy::IngestWithoutDate
}

fn default_database_path() -> String {
    "taknews.db".to_string()
}
