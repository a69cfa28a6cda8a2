//! Versioned offline cache for static application resources.
//!
//! This module keeps the client loadable with no network:
//! - a fixed manifest of resources is eagerly fetched and stored under a
//!   generation label derived from the manifest contents
//! - intercepted resource requests are answered cache-first, with network
//!   fall-through for anything outside the manifest
//! - activation deletes every generation other than the current one, the
//!   cache's only garbage collection

mod layer;
mod resource;
mod store;

pub use layer::ResourceCache;
pub use resource::{CachedResource, Generation, Manifest};
pub use store::CacheStore;
