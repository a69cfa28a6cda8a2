//! Deferred sync work and push notifications.
//!
//! While offline, audit writes pile up in the record store's mutation
//! queue and a sync task is registered. When the host signals that
//! connectivity is back, the [`SyncCoordinator`] flushes the queue. Push
//! messages arriving from the server are turned into user-visible
//! notifications here as well.

mod coordinator;
mod push;

pub use coordinator::{flush_audit_mutations, SyncCoordinator, SYNC_AUDIT_DATA};
pub use push::{
  notification_click, notification_for_push, ClickAction, Notification, DEFAULT_BODY,
  NOTIFICATION_TITLE,
};
