//! Cache storage trait and its backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::net::{ProxyResponse, RequestKey};

use super::traits::CachedEntry;

/// Trait for cache storage backends.
///
/// A backend holds any number of named stores. A store comes into existence on
/// its first successful write and is only listed from then on.
#[async_trait]
pub trait CacheStorage: Send + Sync {
  /// Look up an entry in a named store.
  async fn match_entry(&self, cache: &str, key: &RequestKey) -> StorageResult<Option<CachedEntry>>;

  /// Store (or replace) an entry in a named store.
  async fn put(&self, cache: &str, key: &RequestKey, response: &ProxyResponse) -> StorageResult<()>;

  /// Store several entries at once.
  async fn put_all(&self, cache: &str, entries: &[(RequestKey, ProxyResponse)]) -> StorageResult<()> {
    for (key, response) in entries {
      self.put(cache, key, response).await?;
    }
    Ok(())
  }

  /// Delete a named store and all its entries. Returns whether it existed.
  async fn delete(&self, cache: &str) -> StorageResult<bool>;

  /// Names of all existing stores.
  async fn keys(&self) -> StorageResult<Vec<String>>;

  /// Number of entries in a named store.
  async fn entry_count(&self, cache: &str) -> StorageResult<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - every lookup misses and writes are dropped.
pub struct NoopStorage;

#[async_trait]
impl CacheStorage for NoopStorage {
  async fn match_entry(&self, _cache: &str, _key: &RequestKey) -> StorageResult<Option<CachedEntry>> {
    Ok(None) // Always miss
  }

  async fn put(&self, _cache: &str, _key: &RequestKey, _response: &ProxyResponse) -> StorageResult<()> {
    Ok(()) // Discard
  }

  async fn delete(&self, _cache: &str) -> StorageResult<bool> {
    Ok(false)
  }

  async fn keys(&self) -> StorageResult<Vec<String>> {
    Ok(Vec::new())
  }

  async fn entry_count(&self, _cache: &str) -> StorageResult<usize> {
    Ok(0)
  }
}

/// Process-local storage. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
  caches: Mutex<BTreeMap<String, HashMap<RequestKey, CachedEntry>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, BTreeMap<String, HashMap<RequestKey, CachedEntry>>>> {
    self
      .caches
      .lock()
      .map_err(|e| StorageError::Poisoned(e.to_string()))
  }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
  async fn match_entry(&self, cache: &str, key: &RequestKey) -> StorageResult<Option<CachedEntry>> {
    let caches = self.lock()?;
    Ok(caches.get(cache).and_then(|entries| entries.get(key)).cloned())
  }

  async fn put(&self, cache: &str, key: &RequestKey, response: &ProxyResponse) -> StorageResult<()> {
    let mut caches = self.lock()?;
    caches
      .entry(cache.to_string())
      .or_default()
      .insert(key.clone(), CachedEntry::new(response.clone()));
    Ok(())
  }

  async fn put_all(&self, cache: &str, entries: &[(RequestKey, ProxyResponse)]) -> StorageResult<()> {
    let mut caches = self.lock()?;
    let store = caches.entry(cache.to_string()).or_default();
    for (key, response) in entries {
      store.insert(key.clone(), CachedEntry::new(response.clone()));
    }
    Ok(())
  }

  async fn delete(&self, cache: &str) -> StorageResult<bool> {
    Ok(self.lock()?.remove(cache).is_some())
  }

  async fn keys(&self) -> StorageResult<Vec<String>> {
    Ok(self.lock()?.keys().cloned().collect())
  }

  async fn entry_count(&self, cache: &str) -> StorageResult<usize> {
    Ok(self.lock()?.get(cache).map(HashMap::len).unwrap_or(0))
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at the given path.
  pub fn open(path: &Path) -> StorageResult<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StorageError::Unavailable(format!("Failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StorageError::Unavailable(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    debug!(path = %path.display(), "opened cache database");

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StorageError::Unavailable("Could not determine data directory".into()))?;

    Ok(data_dir.join("pokecache").join("cache.db"))
  }

  fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| StorageError::Poisoned(e.to_string()))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> StorageResult<()> {
    self.lock()?.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named stores that have received at least one write
CREATE TABLE IF NOT EXISTS caches (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by sha256(method + url)
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, entry_key)
);
"#;

fn insert_entry(
  conn: &Connection,
  cache: &str,
  key: &RequestKey,
  response: &ProxyResponse,
) -> StorageResult<()> {
  let headers = serde_json::to_string(&response.headers)?;

  conn.execute(
    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?, datetime('now'))",
    params![cache],
  )?;
  conn.execute(
    "INSERT OR REPLACE INTO cache_entries (cache_name, entry_key, method, url, status, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      cache,
      key.digest(),
      key.method,
      key.url,
      response.status,
      headers,
      &response.body[..]
    ],
  )?;

  Ok(())
}

#[async_trait]
impl CacheStorage for SqliteStorage {
  async fn match_entry(&self, cache: &str, key: &RequestKey) -> StorageResult<Option<CachedEntry>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM cache_entries
         WHERE cache_name = ? AND entry_key = ?",
        params![cache, key.digest()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    match row {
      Some((status, headers, body, cached_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
        Ok(Some(CachedEntry {
          response: ProxyResponse {
            status,
            headers,
            body: body.into(),
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  async fn put(&self, cache: &str, key: &RequestKey, response: &ProxyResponse) -> StorageResult<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    insert_entry(&tx, cache, key, response)?;
    tx.commit()?;
    Ok(())
  }

  async fn put_all(&self, cache: &str, entries: &[(RequestKey, ProxyResponse)]) -> StorageResult<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    for (key, response) in entries {
      insert_entry(&tx, cache, key, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  async fn delete(&self, cache: &str) -> StorageResult<bool> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cache_entries WHERE cache_name = ?", params![cache])?;
    let removed = tx.execute("DELETE FROM caches WHERE name = ?", params![cache])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  async fn keys(&self) -> StorageResult<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY name")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  async fn entry_count(&self, cache: &str) -> StorageResult<usize> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?",
      params![cache],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> StorageResult<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StorageError::Corrupt(format!("Failed to parse datetime '{}': {}", s, e)))
}
