//! Error taxonomy for the session manager's public surface.

use thiserror::Error;

/// Everything a session operation can report to its caller.
///
/// Unexpected failures (storage unavailable, snapshot unwritable) are
/// downgraded to [`AuthError::Connection`] at the operation boundary rather
/// than propagated as-is, so callers only ever see this taxonomy.
#[derive(Debug, Error)]
pub enum AuthError {
  #[error("User not found: {username}")]
  UserNotFound { username: String },

  #[error("Invalid credentials")]
  InvalidCredential,

  #[error("Username already taken: {username}")]
  DuplicateUsername { username: String },

  #[error("Connection error: {reason}")]
  Connection { reason: String },
}

impl AuthError {
  /// Downgrade an unexpected internal error to the generic connection error.
  pub(crate) fn connection(err: impl std::fmt::Display) -> Self {
    AuthError::Connection {
      reason: err.to_string(),
    }
  }
}
