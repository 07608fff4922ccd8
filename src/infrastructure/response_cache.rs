//! Durable HTTP response cache
//!
//! The cache is an explicit port handed to the fetch client. Entries are keyed
//! by normalized URL and only `200 OK` responses are stored. Invalidation
//! deletes the entry outright, so the next lookup misses and the fetch client
//! goes back to the network before anything is trusted again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::crawl_error::{CrawlError, CrawlResult};

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> CrawlResult<Option<CacheEntry>>;

    async fn store(&self, key: &str, entry: &CacheEntry) -> CrawlResult<()>;

    /// Drop the entry for `key`. Returns whether an entry existed.
    async fn invalidate(&self, key: &str) -> CrawlResult<bool>;
}

/// Cache key for a request: query pairs (including `extra_params`) sorted,
/// fragment dropped.
pub fn normalize_url(url: &str, extra_params: &[(String, String)]) -> CrawlResult<String> {
    let mut parsed = Url::parse(url).map_err(|e| CrawlError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .chain(extra_params.iter().cloned())
        .collect();
    pairs.sort();

    parsed.set_fragment(None);
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    Ok(parsed.to_string())
}

/// SQLite-backed cache that survives across runs.
pub struct SqliteResponseCache {
    pool: SqlitePool,
}

impl SqliteResponseCache {
    pub async fn open(path: &Path) -> CrawlResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let cache = Self { pool };
        cache.migrate().await?;
        info!("Response cache opened at {:?}", path);
        Ok(cache)
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> CrawlResult<Self> {
        // A single connection keeps every query on the same memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let cache = Self { pool };
        cache.migrate().await?;
        Ok(cache)
    }

    async fn migrate(&self) -> CrawlResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS responses (
                cache_key TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn len(&self) -> CrawlResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM responses")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

#[async_trait]
impl ResponseCache for SqliteResponseCache {
    async fn get(&self, key: &str) -> CrawlResult<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT url, status, headers, body, fetched_at FROM responses WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let headers: String = row.try_get("headers")?;
        let status: i64 = row.try_get("status")?;
        Ok(Some(CacheEntry {
            url: row.try_get("url")?,
            status: u16::try_from(status).unwrap_or_default(),
            headers: serde_json::from_str(&headers)?,
            body: row.try_get("body")?,
            fetched_at: row.try_get("fetched_at")?,
        }))
    }

    async fn store(&self, key: &str, entry: &CacheEntry) -> CrawlResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO responses (cache_key, url, status, headers, body, fetched_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(&entry.url)
        .bind(i64::from(entry.status))
        .bind(serde_json::to_string(&entry.headers)?)
        .bind(&entry.body)
        .bind(entry.fetched_at)
        .execute(&self.pool)
        .await?;
        debug!("Cached response for {}", key);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CrawlResult<bool> {
        let result = sqlx::query("DELETE FROM responses WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Process-local cache. Counts invalidations so tests can observe them.
#[derive(Default)]
pub struct MemoryResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    invalidations: Mutex<Vec<String>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys passed to `invalidate`, in call order.
    pub fn invalidations(&self) -> Vec<String> {
        self.invalidations
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|m| m.contains_key(key))
            .unwrap_or(false)
    }
}

fn poisoned() -> CrawlError {
    CrawlError::Configuration("memory cache lock poisoned".to_string())
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> CrawlResult<Option<CacheEntry>> {
        Ok(self.entries.lock().map_err(|_| poisoned())?.get(key).cloned())
    }

    async fn store(&self, key: &str, entry: &CacheEntry) -> CrawlResult<()> {
        self.entries
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CrawlResult<bool> {
        self.invalidations
            .lock()
            .map_err(|_| poisoned())?
            .push(key.to_string());
        Ok(self
            .entries
            .lock()
            .map_err(|_| poisoned())?
            .remove(key)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(body: &str) -> CacheEntry {
        CacheEntry {
            url: "https://www.erowid.org/experiences/exp.php?ID=1".to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: body.to_string(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_sorts_query_and_drops_fragment() {
        let key = normalize_url("https://www.erowid.org/experiences/exp.cgi?Max=1000#top", &[
            ("Start".to_string(), "0".to_string()),
            ("Cellar".to_string(), "1".to_string()),
        ])
        .unwrap();
        assert_eq!(
            key,
            "https://www.erowid.org/experiences/exp.cgi?Cellar=1&Max=1000&Start=0"
        );
    }

    #[test]
    fn test_normalize_plain_url_is_stable() {
        let url = "https://www.erowid.org/experiences/exp.php?ID=1234";
        assert_eq!(normalize_url(url, &[]).unwrap(), url);
        assert!(normalize_url("not a url", &[]).is_err());
    }

    #[tokio::test]
    async fn test_sqlite_store_get_invalidate() {
        let cache = SqliteResponseCache::in_memory().await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());

        cache.store("k", &entry("<html>cached</html>")).await.unwrap();
        let hit = cache.get("k").await.unwrap().unwrap();
        assert_eq!(hit.body, "<html>cached</html>");
        assert_eq!(hit.headers[0].0, "content-type");

        assert!(cache.invalidate("k").await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.invalidate("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache").join("responses.sqlite");
        {
            let cache = SqliteResponseCache::open(&path).await.unwrap();
            cache.store("k", &entry("persisted")).await.unwrap();
        }
        let reopened = SqliteResponseCache::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 1);
        assert_eq!(reopened.get("k").await.unwrap().unwrap().body, "persisted");
    }

    #[tokio::test]
    async fn test_memory_cache_records_invalidations() {
        let cache = MemoryResponseCache::new();
        cache.store("k", &entry("x")).await.unwrap();
        assert!(cache.invalidate("k").await.unwrap());
        assert!(!cache.contains("k"));
        assert_eq!(cache.invalidations(), vec!["k".to_string()]);
    }
}
