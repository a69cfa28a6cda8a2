//! Persisted session snapshot.
//!
//! A single serialized user record at a well-known path. Written on
//! successful login, removed on logout, read once when the session manager
//! initializes. An unreadable or corrupt snapshot is treated exactly like an
//! absent one; nothing downstream ever sees the difference.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::warn;

use crate::session::User;

/// File-backed store for the session snapshot.
pub struct SnapshotStore {
  path: PathBuf,
}

impl SnapshotStore {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// Load the snapshot. Absence and corruption both resolve to `None`.
  pub fn load(&self) -> Option<User> {
    let contents = std::fs::read_to_string(&self.path).ok()?;
    match serde_json::from_str(&contents) {
      Ok(user) => Some(user),
      Err(err) => {
        warn!("Ignoring corrupt session snapshot: {}", err);
        None
      }
    }
  }

  /// Persist the signed-in user.
  pub fn save(&self, user: &User) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let contents =
      serde_json::to_string(user).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;
    std::fs::write(&self.path, contents)
      .map_err(|e| eyre!("Failed to write snapshot {}: {}", self.path.display(), e))?;

    Ok(())
  }

  /// Remove the snapshot. Removing an absent snapshot is not an error.
  pub fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(eyre!("Failed to remove snapshot {}: {}", self.path.display(), err)),
    }
  }

  /// Whether a snapshot currently exists on disk.
  pub fn exists(&self) -> bool {
    self.path.exists()
  }
}
