//! Resource manifests, generation labels and cached responses.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;

/// Ordered list of resource paths materialized for offline use.
///
/// Only manifest entries are ever cached; anything else is fetched from the
/// network on every request. The manifest should cover at least the entry
/// document and its primary script and style bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
  urls: Vec<String>,
}

impl Manifest {
  pub fn new(urls: Vec<String>) -> Self {
    Self { urls }
  }

  pub fn urls(&self) -> &[String] {
    &self.urls
  }

  pub fn len(&self) -> usize {
    self.urls.len()
  }

  pub fn is_empty(&self) -> bool {
    self.urls.is_empty()
  }
}

/// Label of a cache generation.
///
/// Derived from the manifest contents, so editing the manifest always
/// produces a fresh generation and activation reliably collects the old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation(String);

impl Generation {
  pub fn derive(manifest: &Manifest) -> Self {
    let mut hasher = Sha256::new();
    for url in manifest.urls() {
      hasher.update(url.as_bytes());
      hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());

    Self(format!("res-{}", &digest[..12]))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Generation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A resource exactly as it was fetched at install time. Served verbatim on
/// a cache hit, with no revalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResource {
  pub url: String,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_generation_tracks_manifest_contents() {
    let v1 = Manifest::new(vec!["/".into(), "/app.css".into()]);
    let v2 = Manifest::new(vec!["/".into(), "/app.css".into(), "/new.js".into()]);

    assert_eq!(Generation::derive(&v1), Generation::derive(&v1));
    assert_ne!(Generation::derive(&v1), Generation::derive(&v2));
  }

  #[test]
  fn test_generation_is_order_sensitive() {
    let a = Manifest::new(vec!["/a".into(), "/b".into()]);
    let b = Manifest::new(vec!["/b".into(), "/a".into()]);
    assert_ne!(Generation::derive(&a), Generation::derive(&b));
  }

  #[test]
  fn test_generation_label_shape() {
    let label = Generation::derive(&Manifest::new(vec!["/".into()]));
    assert!(label.as_str().starts_with("res-"));
    assert_eq!(label.as_str().len(), "res-".len() + 12);
  }
}
