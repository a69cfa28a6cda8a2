//! Offline-first session and cache core for a field audit client.
//!
//! Field inspectors record audits, anomalies and media on site, usually with
//! no connectivity. This crate provides the pieces that make that work:
//!
//! - [`store`] - durable local persistence for users, settings and audit
//!   records, plus the queue of writes made while offline
//! - [`session`] - the single authority over who is signed in, verified
//!   against the record store
//! - [`cache`] - a versioned, cache-first store of static application
//!   resources so the client loads without a network
//! - [`sync`] - deferred work executed when connectivity returns, and
//!   handling of server-pushed notifications
//!
//! UI concerns live elsewhere; everything here is driven through plain
//! function calls by whatever front end hosts it.

pub mod audit;
pub mod cache;
pub mod config;
pub mod net;
pub mod session;
pub mod store;
pub mod sync;
