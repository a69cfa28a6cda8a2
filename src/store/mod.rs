//! Durable local persistence for users, settings and audit records.
//!
//! Everything the client knows lives on the device: user accounts and their
//! credentials, application settings, the audit records themselves, and the
//! queue of writes made while offline. The session manager only depends on
//! the [`RecordStore`] trait; [`SqliteStore`] is the production
//! implementation and also carries the record blobs and the offline
//! mutation queue.

mod snapshot;
mod sqlite;

pub use snapshot::SnapshotStore;
pub use sqlite::{PendingMutation, SqliteStore};

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};

use crate::session::User;

/// Trait for entities persisted as opaque JSON blobs in the records table.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier of this record within its type
  fn record_key(&self) -> String;

  /// Type name for storage organization (e.g., "audit")
  fn record_type() -> &'static str;
}

/// Contract the session manager relies on for identity and credential
/// lookups. Credentials are settings: the global technician secret lives
/// under `technician_password`, per-user secrets under
/// `user_password_<userId>`.
pub trait RecordStore: Send + Sync {
  /// Look up a user by exact, case-sensitive username.
  fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

  /// Persist a new user. Fails if the username is already taken.
  fn create_user(&self, user: &User) -> Result<()>;

  /// Persist changes to an existing user.
  fn update_user(&self, user: &User) -> Result<()>;

  /// Read a setting value.
  fn get_setting(&self, key: &str) -> Result<Option<String>>;

  /// Write a setting value, replacing any previous one.
  fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}
