//! Identity and session state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved username for the maintenance identity. Logging in with it takes
/// the technician path: the submitted secret is checked against the global
/// technician credential instead of a per-user one.
pub const TECHNICIAN_USERNAME: &str = "technician";

/// Role of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  /// Field inspector recording audits
  Auditor,
  /// Maintenance identity with access to every audit
  Technician,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Auditor => "auditor",
      Role::Technician => "technician",
    }
  }

  pub fn parse(s: &str) -> Option<Role> {
    match s {
      "auditor" => Some(Role::Auditor),
      "technician" => Some(Role::Technician),
      _ => None,
    }
  }
}

/// A user account. Credentials are never stored on this record; they live
/// in the settings table under a derived key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  /// Unique, compared case-sensitively
  pub username: String,
  pub role: Role,
  pub name: String,
  pub email: Option<String>,
  pub created_at: DateTime<Utc>,
  pub last_login: Option<DateTime<Utc>>,
}

/// Credentials submitted at login time.
#[derive(Debug, Clone)]
pub struct LoginCredentials {
  pub username: String,
  pub password: String,
}

/// Data needed to create a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub username: String,
  pub password: String,
  pub name: String,
  pub email: Option<String>,
}

/// The process-wide notion of who is signed in.
///
/// `is_authenticated` is always `user.is_some()`; the flag exists so
/// subscribers can branch without inspecting the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
  pub user: Option<User>,
  pub is_authenticated: bool,
  pub is_loading: bool,
}

impl SessionState {
  /// State before the persisted snapshot has been resolved.
  pub fn loading() -> Self {
    Self {
      user: None,
      is_authenticated: false,
      is_loading: true,
    }
  }

  /// Nobody signed in.
  pub fn signed_out() -> Self {
    Self {
      user: None,
      is_authenticated: false,
      is_loading: false,
    }
  }

  /// A resolved, signed-in session.
  pub fn authenticated(user: User) -> Self {
    Self {
      user: Some(user),
      is_authenticated: true,
      is_loading: false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_state_constructors_keep_flag_consistent() {
    assert!(!SessionState::signed_out().is_authenticated);
    assert!(SessionState::signed_out().user.is_none());

    let user = User {
      id: "user_1".into(),
      username: "ines".into(),
      role: Role::Auditor,
      name: "Ines".into(),
      email: None,
      created_at: Utc::now(),
      last_login: None,
    };
    let state = SessionState::authenticated(user);
    assert!(state.is_authenticated);
    assert!(state.user.is_some());
    assert!(!state.is_loading);
  }

  #[test]
  fn test_role_round_trip() {
    assert_eq!(Role::parse("auditor"), Some(Role::Auditor));
    assert_eq!(Role::parse("technician"), Some(Role::Technician));
    assert_eq!(Role::parse("admin"), None);
    assert_eq!(Role::parse(Role::Technician.as_str()), Some(Role::Technician));
  }
}
