//! Cache-first resource layer: install, fetch, activate.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use super::resource::{CachedResource, Generation, Manifest};
use super::store::CacheStore;

/// Versioned, cache-first store of static application resources.
///
/// The lifecycle mirrors how the host runtime drives it: `install` eagerly
/// materializes the manifest under the current generation, `fetch` answers
/// intercepted resource requests cache-first, and `activate` collects every
/// generation other than the current one. The generation label is derived
/// from the manifest, so a manifest edit always installs into a fresh
/// generation.
pub struct ResourceCache {
  store: Arc<CacheStore>,
  manifest: Manifest,
  generation: Generation,
}

impl ResourceCache {
  pub fn new(store: Arc<CacheStore>, manifest: Manifest) -> Self {
    let generation = Generation::derive(&manifest);
    Self {
      store,
      manifest,
      generation,
    }
  }

  pub fn generation(&self) -> &Generation {
    &self.generation
  }

  pub fn manifest(&self) -> &Manifest {
    &self.manifest
  }

  /// Eagerly fetch every manifest resource and store the set under the
  /// current generation.
  ///
  /// All-or-nothing: a single unreachable resource fails the whole install
  /// and leaves the generation untouched, so a partially populated
  /// generation can never be served.
  pub async fn install<F, Fut>(&self, fetcher: F) -> Result<()>
  where
    F: Fn(&str) -> Fut,
    Fut: Future<Output = Result<CachedResource>>,
  {
    let mut resources = Vec::with_capacity(self.manifest.len());
    for url in self.manifest.urls() {
      let resource = fetcher(url)
        .await
        .map_err(|e| eyre!("Failed to install {}: {}", url, e))?;
      resources.push(resource);
    }

    self.store.put_all(&self.generation, &resources)?;
    info!(
      generation = %self.generation,
      resources = resources.len(),
      "installed resource cache"
    );

    Ok(())
  }

  /// Answer a resource request cache-first.
  ///
  /// An exact-URL hit in the current generation is returned verbatim, with
  /// no revalidation. A miss falls through to the network fetcher, and the
  /// result is NOT cached: the manifest stays the single source of truth
  /// for what is available offline.
  pub async fn fetch<F, Fut>(&self, url: &str, fetcher: F) -> Result<CachedResource>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<CachedResource>>,
  {
    if let Some(hit) = self.store.get(&self.generation, url)? {
      debug!(url, "resource cache hit");
      return Ok(hit);
    }

    debug!(url, "resource cache miss, fetching from network");
    fetcher().await
  }

  /// Delete every generation whose label differs from the current one.
  /// This is the only garbage collection the cache has; entries never
  /// expire individually. Returns the deleted labels.
  pub fn activate(&self) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for label in self.store.generations()? {
      if label != self.generation.as_str() {
        info!(generation = %label, "deleting old resource cache");
        self.store.delete_generation(&label)?;
        removed.push(label);
      }
    }

    Ok(removed)
  }
}
