//! Sqlite-backed record store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::session::{Role, User};

use super::{Record, RecordStore};

/// A write queued while offline, waiting to be flushed by the sync
/// coordinator once connectivity returns.
#[derive(Debug, Clone)]
pub struct PendingMutation {
  pub id: i64,
  pub record_type: String,
  pub record_key: String,
  pub payload: Vec<u8>,
  pub queued_at: DateTime<Utc>,
}

/// Sqlite implementation of the record store.
///
/// The connection is shared behind a mutex; all access is synchronous and
/// short-lived. Resource caching uses a separate database file, this one
/// only holds records.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the records database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open records database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Open a private in-memory database, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Run database migrations for the record tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(RECORDS_SCHEMA)
      .map_err(|e| eyre!("Failed to run record migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  // ==========================================================================
  // Records (audit entities as serialized JSON)
  // ==========================================================================

  /// Store a record, replacing any previous version.
  pub fn put_record<T: Record>(&self, record: &T) -> Result<()> {
    let conn = self.lock()?;
    let data =
      serde_json::to_vec(record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO records (record_type, record_key, data, updated_at)
         VALUES (?, ?, ?, ?)",
        params![T::record_type(), record.record_key(), data, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to store record: {}", e))?;

    Ok(())
  }

  /// Get a single record by key.
  pub fn get_record<T: Record>(&self, key: &str) -> Result<Option<T>> {
    let conn = self.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM records WHERE record_type = ? AND record_key = ?",
        params![T::record_type(), key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query record: {}", e))?;

    match data {
      Some(data) => {
        let record =
          serde_json::from_slice(&data).map_err(|e| eyre!("Failed to deserialize record: {}", e))?;
        Ok(Some(record))
      }
      None => Ok(None),
    }
  }

  /// List every record of a type, most recently updated first.
  pub fn list_records<T: Record>(&self) -> Result<Vec<T>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT data FROM records WHERE record_type = ? ORDER BY updated_at DESC")
      .map_err(|e| eyre!("Failed to prepare record query: {}", e))?;

    let records: Vec<T> = stmt
      .query_map(params![T::record_type()], |row| {
        let data: Vec<u8> = row.get(0)?;
        Ok(data)
      })
      .map_err(|e| eyre!("Failed to query records: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_slice(&data).ok())
      .collect();

    Ok(records)
  }

  /// Delete a record. Returns whether anything was removed.
  pub fn delete_record<T: Record>(&self, key: &str) -> Result<bool> {
    let conn = self.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM records WHERE record_type = ? AND record_key = ?",
        params![T::record_type(), key],
      )
      .map_err(|e| eyre!("Failed to delete record: {}", e))?;

    Ok(removed > 0)
  }

  // ==========================================================================
  // Offline mutation queue
  // ==========================================================================

  /// Queue a record write for later delivery. Returns the queue id.
  pub fn queue_mutation<T: Record>(&self, record: &T) -> Result<i64> {
    let conn = self.lock()?;
    let payload =
      serde_json::to_vec(record).map_err(|e| eyre!("Failed to serialize mutation: {}", e))?;

    conn
      .execute(
        "INSERT INTO pending_mutations (record_type, record_key, payload)
         VALUES (?, ?, ?)",
        params![T::record_type(), record.record_key(), payload],
      )
      .map_err(|e| eyre!("Failed to queue mutation: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  /// All queued mutations in the order they were made.
  pub fn pending_mutations(&self) -> Result<Vec<PendingMutation>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT id, record_type, record_key, payload, queued_at
         FROM pending_mutations ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare mutation query: {}", e))?;

    let mutations = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, Vec<u8>>(3)?,
          row.get::<_, String>(4)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query mutations: {}", e))?
      .filter_map(|r| r.ok())
      .map(|(id, record_type, record_key, payload, queued_at)| {
        Ok(PendingMutation {
          id,
          record_type,
          record_key,
          payload,
          queued_at: parse_datetime(&queued_at)?,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(mutations)
  }

  /// Remove delivered mutations from the queue.
  pub fn clear_mutations(&self, ids: &[i64]) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    for id in ids {
      tx.execute("DELETE FROM pending_mutations WHERE id = ?", params![id])
        .map_err(|e| eyre!("Failed to clear mutation {}: {}", id, e))?;
    }
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  // ==========================================================================
  // Deferred sync tasks
  // ==========================================================================

  /// Mark deferred work under `tag` as pending. Idempotent.
  pub fn request_sync_task(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO sync_tasks (tag, requested_at) VALUES (?, ?)",
        params![tag, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to request sync task: {}", e))?;

    Ok(())
  }

  /// Whether deferred work under `tag` is still pending.
  pub fn sync_task_pending(&self, tag: &str) -> Result<bool> {
    let conn = self.lock()?;

    let found: Option<String> = conn
      .query_row(
        "SELECT tag FROM sync_tasks WHERE tag = ?",
        params![tag],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query sync task: {}", e))?;

    Ok(found.is_some())
  }

  /// Consume a completed sync task.
  pub fn complete_sync_task(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM sync_tasks WHERE tag = ?", params![tag])
      .map_err(|e| eyre!("Failed to complete sync task: {}", e))?;

    Ok(())
  }
}

/// Schema for the record tables.
const RECORDS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL,
    name TEXT NOT NULL,
    email TEXT,
    created_at TEXT NOT NULL,
    last_login TEXT
);

-- Application settings and stored credentials (key-value)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Audit entities as serialized JSON, keyed by type + id
CREATE TABLE IF NOT EXISTS records (
    record_type TEXT NOT NULL,
    record_key TEXT NOT NULL,
    data BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (record_type, record_key)
);

-- Writes made while offline, drained when connectivity returns
CREATE TABLE IF NOT EXISTS pending_mutations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_type TEXT NOT NULL,
    record_key TEXT NOT NULL,
    payload BLOB NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Deferred work registered for the next connectivity signal
CREATE TABLE IF NOT EXISTS sync_tasks (
    tag TEXT PRIMARY KEY,
    requested_at TEXT NOT NULL
);
"#;

impl RecordStore for SqliteStore {
  fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
    let conn = self.lock()?;

    let row: Option<(String, String, String, String, Option<String>, String, Option<String>)> =
      conn
        .query_row(
          "SELECT id, username, role, name, email, created_at, last_login
           FROM users WHERE username = ?",
          params![username],
          |row| {
            Ok((
              row.get(0)?,
              row.get(1)?,
              row.get(2)?,
              row.get(3)?,
              row.get(4)?,
              row.get(5)?,
              row.get(6)?,
            ))
          },
        )
        .optional()
        .map_err(|e| eyre!("Failed to query user {}: {}", username, e))?;

    match row {
      Some((id, username, role, name, email, created_at, last_login)) => {
        let role = Role::parse(&role).ok_or_else(|| eyre!("Unknown role '{}'", role))?;
        Ok(Some(User {
          id,
          username,
          role,
          name,
          email,
          created_at: parse_rfc3339(&created_at)?,
          last_login: last_login.as_deref().map(parse_rfc3339).transpose()?,
        }))
      }
      None => Ok(None),
    }
  }

  fn create_user(&self, user: &User) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT INTO users (id, username, role, name, email, created_at, last_login)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          user.id,
          user.username,
          user.role.as_str(),
          user.name,
          user.email,
          user.created_at.to_rfc3339(),
          user.last_login.map(|t| t.to_rfc3339()),
        ],
      )
      .map_err(|e| eyre!("Failed to create user {}: {}", user.username, e))?;

    Ok(())
  }

  fn update_user(&self, user: &User) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "UPDATE users SET username = ?, role = ?, name = ?, email = ?, created_at = ?, last_login = ?
         WHERE id = ?",
        params![
          user.username,
          user.role.as_str(),
          user.name,
          user.email,
          user.created_at.to_rfc3339(),
          user.last_login.map(|t| t.to_rfc3339()),
          user.id,
        ],
      )
      .map_err(|e| eyre!("Failed to update user {}: {}", user.username, e))?;

    Ok(())
  }

  fn get_setting(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;

    conn
      .query_row("SELECT value FROM settings WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to query setting {}: {}", key, e))
  }

  fn set_setting(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to set setting {}: {}", key, e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite's `datetime('now')` format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", s, e))
}
