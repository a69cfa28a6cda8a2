//! Session management: the single authority over who is signed in.
//!
//! The [`SessionManager`] verifies credentials against the record store,
//! owns the one mutable [`SessionState`], and announces every transition to
//! its subscribers. Nothing else in the application mutates session state.

mod credential;
mod error;
mod manager;
mod types;

pub use credential::{hash_secret, verify_secret};
pub use error::AuthError;
pub use manager::{user_secret_key, SessionManager, Subscription, TECHNICIAN_SECRET_KEY};
pub use types::{
  LoginCredentials, NewUser, Role, SessionState, User, TECHNICIAN_USERNAME,
};
