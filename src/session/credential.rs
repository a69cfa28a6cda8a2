//! Credential hashing and verification.
//!
//! Secrets are stored as Argon2id PHC strings, never as plaintext. A stored
//! value that fails to parse as a PHC string is treated as a mismatch, the
//! same as an absent one.

use argon2::{
  password_hash::{rand_core, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
  Argon2,
};
use color_eyre::{eyre::eyre, Result};

/// Hash a secret for storage.
pub fn hash_secret(secret: &str) -> Result<String> {
  let salt = SaltString::generate(&mut rand_core::OsRng);

  Argon2::default()
    .hash_password(secret.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| eyre!("Failed to hash credential: {}", e))
}

/// Check a submitted secret against a stored hash.
pub fn verify_secret(secret: &str, stored: &str) -> bool {
  match PasswordHash::new(stored) {
    Ok(parsed) => Argon2::default()
      .verify_password(secret.as_bytes(), &parsed)
      .is_ok(),
    Err(_) => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hash_then_verify() {
    let hash = hash_secret("terrain-2024").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(verify_secret("terrain-2024", &hash));
    assert!(!verify_secret("terrain-2025", &hash));
  }

  #[test]
  fn test_garbage_stored_value_is_a_mismatch() {
    assert!(!verify_secret("anything", "not-a-phc-string"));
    assert!(!verify_secret("anything", ""));
  }
}
