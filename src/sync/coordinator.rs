//! Deferred-work queue driven by connectivity signals.

use color_eyre::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::store::{PendingMutation, SqliteStore};

/// Tag of the one deferred task this client registers: flushing audit
/// mutations queued while offline.
pub const SYNC_AUDIT_DATA: &str = "sync-audit-data";

/// Executes deferred work when the host signals that connectivity is back.
///
/// A task is requested while offline, then runs on the next qualifying
/// connectivity signal. It is consumed only when its flush succeeds; a
/// failed flush stays queued and is retried on the next signal. There is no
/// backoff and no user-visible error surface, only logs.
pub struct SyncCoordinator {
  store: Arc<SqliteStore>,
  in_flight: Mutex<HashSet<String>>,
}

impl SyncCoordinator {
  pub fn new(store: Arc<SqliteStore>) -> Self {
    Self {
      store,
      in_flight: Mutex::new(HashSet::new()),
    }
  }

  /// Queue deferred work under `tag`. Idempotent until the task is
  /// consumed.
  pub fn request(&self, tag: &str) -> Result<()> {
    self.store.request_sync_task(tag)?;
    debug!(tag, "sync task requested");
    Ok(())
  }

  /// Host signal: connectivity regained for `tag`.
  ///
  /// Runs `flush` only when the tag is the one this coordinator knows,
  /// a task for it is pending, and no execution of it is already in
  /// flight. Returns whether the task was completed by this call.
  pub async fn connectivity_regained<F, Fut>(&self, tag: &str, flush: F) -> Result<bool>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    if tag != SYNC_AUDIT_DATA {
      debug!(tag, "ignoring unknown sync tag");
      return Ok(false);
    }
    if !self.store.sync_task_pending(tag)? {
      return Ok(false);
    }

    // At most one execution per tag at any time
    {
      let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
      if !in_flight.insert(tag.to_string()) {
        debug!(tag, "sync already in flight");
        return Ok(false);
      }
    }

    let outcome = flush().await;

    self
      .in_flight
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .remove(tag);

    match outcome {
      Ok(()) => {
        self.store.complete_sync_task(tag)?;
        info!(tag, "sync task completed");
        Ok(true)
      }
      Err(err) => {
        warn!(tag, "sync failed, will retry on next connectivity signal: {}", err);
        Ok(false)
      }
    }
  }
}

/// Drain queued audit mutations and hand them to `deliver`.
///
/// The queue is cleared only after delivery succeeds; a failed delivery
/// leaves every mutation in place for the next attempt.
pub async fn flush_audit_mutations<F, Fut>(store: &SqliteStore, deliver: F) -> Result<()>
where
  F: FnOnce(Vec<PendingMutation>) -> Fut,
  Fut: Future<Output = Result<()>>,
{
  let pending = store.pending_mutations()?;
  if pending.is_empty() {
    debug!("no queued audit mutations");
    return Ok(());
  }

  let ids: Vec<i64> = pending.iter().map(|m| m.id).collect();
  deliver(pending).await?;
  store.clear_mutations(&ids)?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::audit::Audit;
  use crate::session::{Role, User};
  use chrono::Utc;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn store_with_queued_audit() -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let auditor = User {
      id: "user_1".into(),
      username: "ines".into(),
      role: Role::Auditor,
      name: "Ines".into(),
      email: None,
      created_at: Utc::now(),
      last_login: None,
    };
    let audit = Audit::new("Offline audit", "Site 4", &auditor);
    store.queue_mutation(&audit).unwrap();
    store
  }

  #[tokio::test]
  async fn test_task_consumed_on_success() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let coordinator = SyncCoordinator::new(Arc::clone(&store));

    coordinator.request(SYNC_AUDIT_DATA).unwrap();
    let ran = coordinator
      .connectivity_regained(SYNC_AUDIT_DATA, || async { Ok(()) })
      .await
      .unwrap();
    assert!(ran);
    assert!(!store.sync_task_pending(SYNC_AUDIT_DATA).unwrap());

    // Consumed: a second signal finds nothing to do
    let ran = coordinator
      .connectivity_regained(SYNC_AUDIT_DATA, || async { Ok(()) })
      .await
      .unwrap();
    assert!(!ran);
  }

  #[tokio::test]
  async fn test_failed_flush_is_retried_on_next_signal() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let coordinator = SyncCoordinator::new(Arc::clone(&store));
    coordinator.request(SYNC_AUDIT_DATA).unwrap();

    let ran = coordinator
      .connectivity_regained(SYNC_AUDIT_DATA, || async { Err(eyre!("still offline")) })
      .await
      .unwrap();
    assert!(!ran);
    assert!(store.sync_task_pending(SYNC_AUDIT_DATA).unwrap());

    // Next signal retries and succeeds
    let ran = coordinator
      .connectivity_regained(SYNC_AUDIT_DATA, || async { Ok(()) })
      .await
      .unwrap();
    assert!(ran);
    assert!(!store.sync_task_pending(SYNC_AUDIT_DATA).unwrap());
  }

  #[tokio::test]
  async fn test_unknown_tag_is_ignored() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let coordinator = SyncCoordinator::new(Arc::clone(&store));
    coordinator.request(SYNC_AUDIT_DATA).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let ran = coordinator
      .connectivity_regained("sync-something-else", || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
      })
      .await
      .unwrap();
    assert!(!ran);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.sync_task_pending(SYNC_AUDIT_DATA).unwrap());
  }

  #[tokio::test]
  async fn test_signal_without_pending_task_is_a_noop() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let coordinator = SyncCoordinator::new(store);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let ran = coordinator
      .connectivity_regained(SYNC_AUDIT_DATA, || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
      })
      .await
      .unwrap();
    assert!(!ran);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_flush_clears_queue_on_success_only() {
    let store = store_with_queued_audit();

    // Failed delivery leaves the queue intact
    let result = flush_audit_mutations(&store, |_batch| async {
      Err(eyre!("endpoint unreachable"))
    })
    .await;
    assert!(result.is_err());
    assert_eq!(store.pending_mutations().unwrap().len(), 1);

    // Successful delivery receives the batch and clears it
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    flush_audit_mutations(&store, |batch| async move {
      counter.store(batch.len(), Ordering::SeqCst);
      Ok(())
    })
    .await
    .unwrap();
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert!(store.pending_mutations().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_end_to_end_flush_through_coordinator() {
    let store = store_with_queued_audit();
    let coordinator = SyncCoordinator::new(Arc::clone(&store));
    coordinator.request(SYNC_AUDIT_DATA).unwrap();

    let ran = coordinator
      .connectivity_regained(SYNC_AUDIT_DATA, || {
        let store = Arc::clone(&store);
        async move { flush_audit_mutations(&store, |_batch| async { Ok(()) }).await }
      })
      .await
      .unwrap();

    assert!(ran);
    assert!(store.pending_mutations().unwrap().is_empty());
    assert!(!store.sync_task_pending(SYNC_AUDIT_DATA).unwrap());
  }
}
