//! Sqlite-backed storage for cached resource generations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::resource::{CachedResource, Generation};

/// Storage for cached resources, grouped by generation label.
///
/// Kept on its own database file so the resource cache can be wiped or
/// rebuilt without touching audit records.
pub struct CacheStore {
  conn: Mutex<Connection>,
}

impl CacheStore {
  /// Open or create the cache database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Open a private in-memory database, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Store a full set of resources under one generation in a single
  /// transaction, replacing whatever that generation held before. Either
  /// every resource lands or none do.
  pub fn put_all(&self, generation: &Generation, resources: &[CachedResource]) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM resource_cache WHERE generation = ?",
      params![generation.as_str()],
    )
    .map_err(|e| eyre!("Failed to clear generation: {}", e))?;

    for resource in resources {
      tx.execute(
        "INSERT INTO resource_cache (generation, url, content_type, body, fetched_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
          generation.as_str(),
          resource.url,
          resource.content_type,
          resource.body,
          resource.fetched_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store resource {}: {}", resource.url, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  /// Exact-URL lookup within one generation.
  pub fn get(&self, generation: &Generation, url: &str) -> Result<Option<CachedResource>> {
    let conn = self.lock()?;

    let row: Option<(Option<String>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT content_type, body, fetched_at FROM resource_cache
         WHERE generation = ? AND url = ?",
        params![generation.as_str(), url],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query resource {}: {}", url, e))?;

    match row {
      Some((content_type, body, fetched_at)) => Ok(Some(CachedResource {
        url: url.to_string(),
        content_type,
        body,
        fetched_at: parse_rfc3339(&fetched_at)?,
      })),
      None => Ok(None),
    }
  }

  /// Distinct generation labels currently present.
  pub fn generations(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT generation FROM resource_cache ORDER BY generation")
      .map_err(|e| eyre!("Failed to prepare generation query: {}", e))?;

    let labels = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query generations: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(labels)
  }

  /// Delete every resource under one generation label.
  pub fn delete_generation(&self, label: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM resource_cache WHERE generation = ?",
        params![label],
      )
      .map_err(|e| eyre!("Failed to delete generation {}: {}", label, e))?;

    Ok(())
  }

  /// Number of resources stored under one generation.
  pub fn resource_count(&self, generation: &Generation) -> Result<u64> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM resource_cache WHERE generation = ?",
        params![generation.as_str()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count resources: {}", e))?;

    Ok(count as u64)
  }
}

/// Schema for the resource cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS resource_cache (
    generation TEXT NOT NULL,
    url TEXT NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (generation, url)
);

CREATE INDEX IF NOT EXISTS idx_resource_cache_generation
    ON resource_cache(generation);
"#;

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", s, e))
}
