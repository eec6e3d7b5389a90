//! SQLite persistence for articles and tags.
//!
//! Schema:
//!
//! ```text
//! articles      id, url (UNIQUE), title, content, published_at (NULLable,
//!               RFC 3339 UTC), is_active, created_at
//! tags          id, name (UNIQUE, case-sensitive), slug (UNIQUE)
//! article_tags  article_id, tag_id (UNIQUE pair)
//! ```
//!
//! All writes for one article happen inside a single transaction obtained
//! through [`Store::with_tx`]; the uniqueness constraints are the enforcement
//! mechanism for idempotence, and an insert that lost a race is re-read as
//! "already exists" rather than treated as a failure.

use crate::models::Watermark;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A row that was just inserted (or lost an insert race) could not be
    /// read back; indicates store corruption.
    #[error("row vanished after insert: {0}")]
    RowVanished(String),
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
  id           INTEGER PRIMARY KEY,
  url          TEXT NOT NULL UNIQUE,
  title        TEXT NOT NULL,
  content      TEXT NOT NULL,
  published_at TEXT,
  is_active    INTEGER NOT NULL DEFAULT 1,
  created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
);
CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles (published_at DESC);

CREATE TABLE IF NOT EXISTS tags (
  id   INTEGER PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  slug TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS article_tags (
  article_id INTEGER NOT NULL REFERENCES articles(id),
  tag_id     INTEGER NOT NULL REFERENCES tags(id),
  UNIQUE (article_id, tag_id)
);
"#;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and applies the
    /// schema. Failure here is run-fatal: without the store there is no
    /// watermark and nowhere to ingest.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// The most recently published article, supplying the frontier watermark.
    ///
    /// Rows without a publish date sort last so a date-less article can never
    /// become the frontier.
    pub fn latest_article(&self) -> Result<Option<Watermark>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let row = conn
            .query_row(
                "SELECT url, published_at FROM articles
                 ORDER BY published_at IS NULL, published_at DESC
                 LIMIT 1",
                [],
                |row| {
                    let url: String = row.get(0)?;
                    let published_at: Option<String> = row.get(1)?;
                    Ok((url, published_at))
                },
            )
            .optional()?;

        Ok(row.map(|(url, published_at)| Watermark {
            url,
            published_at: published_at.as_deref().and_then(parse_timestamp),
        }))
    }

    /// Run `f` inside one transaction: committed on `Ok`, rolled back on
    /// `Err`. This is the per-article atomic unit of work.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&StoreTx<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        let result = f(&StoreTx { tx: &tx });
        match result {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                // Rollback happens on drop; surface the original error.
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub fn count(&self, table: &str) -> usize {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap() as usize
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The store's write contract, scoped to one open transaction.
pub struct StoreTx<'a> {
    tx: &'a Transaction<'a>,
}

impl StoreTx<'_> {
    /// Insert-only upsert keyed on URL. Returns the row id and whether this
    /// call created it; an existing row is never mutated.
    pub fn get_or_create_article(
        &self,
        url: &str,
        title: &str,
        content: &str,
        published_at: Option<DateTime<Utc>>,
        is_active: bool,
    ) -> Result<(i64, bool), StoreError> {
        if let Some(id) = self.article_id(url)? {
            return Ok((id, false));
        }

        let changed = self.tx.execute(
            "INSERT OR IGNORE INTO articles (url, title, content, published_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                url,
                title,
                content,
                published_at.map(|dt| dt.to_rfc3339()),
                is_active,
            ],
        )?;

        if changed > 0 {
            Ok((self.tx.last_insert_rowid(), true))
        } else {
            // Lost an insert race; the constraint means the row now exists.
            self.article_id(url)?
                .map(|id| (id, false))
                .ok_or_else(|| StoreError::RowVanished(url.to_string()))
        }
    }

    /// Get-or-create by case-sensitive name, first-writer-wins under races.
    ///
    /// Distinct names can derive the same slug (`"AI"` / `"ai"` both slugify
    /// to `ai`); the slug gets a numeric suffix in that case so the name to
    /// slug mapping stays a bijection.
    pub fn get_or_create_tag(&self, name: &str, slug: &str) -> Result<i64, StoreError> {
        if let Some(id) = self.tag_id(name)? {
            return Ok(id);
        }

        let mut candidate = slug.to_string();
        for suffix in 2..=16 {
            let changed = self.tx.execute(
                "INSERT OR IGNORE INTO tags (name, slug) VALUES (?1, ?2)",
                params![name, candidate],
            )?;
            if changed > 0 {
                return Ok(self.tx.last_insert_rowid());
            }
            // The insert was ignored by a uniqueness constraint. If it was
            // the name, a concurrent writer won and we reuse its row; if it
            // was the slug, try the next suffixed variant.
            if let Some(id) = self.tag_id(name)? {
                return Ok(id);
            }
            candidate = format!("{slug}-{suffix}");
        }
        Err(StoreError::RowVanished(name.to_string()))
    }

    pub fn associate(&self, article_id: i64, tag_id: i64) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
            params![article_id, tag_id],
        )?;
        Ok(())
    }

    fn article_id(&self, url: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .tx
            .query_row("SELECT id FROM articles WHERE url = ?1", [url], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn tag_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .tx
            .query_row("SELECT id FROM tags WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_empty_store_has_no_watermark() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.latest_article().unwrap().is_none());
    }

    #[test]
    fn test_article_upsert_is_insert_only() {
        let store = Store::open_in_memory().unwrap();

        let (id1, created1) = store
            .with_tx(|tx| {
                tx.get_or_create_article("https://site/a", "First title", "Body", None, true)
            })
            .unwrap();
        assert!(created1);

        // Second ingest of the same URL changes nothing, including fields.
        let (id2, created2) = store
            .with_tx(|tx| {
                tx.get_or_create_article("https://site/a", "Other title", "Other", None, true)
            })
            .unwrap();
        assert!(!created2);
        assert_eq!(id1, id2);
        assert_eq!(store.count("articles"), 1);
    }

    #[test]
    fn test_latest_article_orders_by_published_at() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_tx(|tx| {
                tx.get_or_create_article(
                    "https://site/old",
                    "Old",
                    "",
                    Some(ts("2023-03-01T10:00:00Z")),
                    true,
                )?;
                tx.get_or_create_article(
                    "https://site/new",
                    "New",
                    "",
                    Some(ts("2023-03-21T07:00:00Z")),
                    true,
                )?;
                // Date-less rows must never win the watermark query.
                tx.get_or_create_article("https://site/undated", "Undated", "", None, true)
            })
            .unwrap();

        let watermark = store.latest_article().unwrap().unwrap();
        assert_eq!(watermark.url, "https://site/new");
        assert_eq!(
            watermark.published_at,
            Some(Utc.with_ymd_and_hms(2023, 3, 21, 7, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_tag_get_or_create_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let (first, second) = store
            .with_tx(|tx| {
                let a = tx.get_or_create_tag("Artificial Intelligence", "artificial-intelligence")?;
                let b = tx.get_or_create_tag("Artificial Intelligence", "artificial-intelligence")?;
                Ok((a, b))
            })
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count("tags"), 1);
    }

    #[test]
    fn test_tag_names_are_case_sensitive() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_tx(|tx| {
                tx.get_or_create_tag("AI", "ai")?;
                tx.get_or_create_tag("ai", "ai-2")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.count("tags"), 2);
    }

    #[test]
    fn test_colliding_slugs_get_suffixed() {
        let store = Store::open_in_memory().unwrap();
        let (a, b) = store
            .with_tx(|tx| {
                let a = tx.get_or_create_tag("AI", "ai")?;
                // Different name, same derived slug.
                let b = tx.get_or_create_tag("ai", "ai")?;
                Ok((a, b))
            })
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count("tags"), 2);
    }

    #[test]
    fn test_association_is_deduplicated() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_tx(|tx| {
                let (article, _) =
                    tx.get_or_create_article("https://site/a", "T", "B", None, true)?;
                let tag = tx.get_or_create_tag("mobile", "mobile")?;
                tx.associate(article, tag)?;
                tx.associate(article, tag)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.count("article_tags"), 1);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<(), StoreError> = store.with_tx(|tx| {
            tx.get_or_create_article("https://site/a", "T", "B", None, true)?;
            Err(StoreError::RowVanished("forced".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.count("articles"), 0);
    }
}
