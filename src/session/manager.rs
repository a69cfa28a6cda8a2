//! Session lifecycle: initialize, login, register, logout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{RecordStore, SnapshotStore};

use super::credential::{hash_secret, verify_secret};
use super::error::AuthError;
use super::types::{
  LoginCredentials, NewUser, Role, SessionState, User, TECHNICIAN_USERNAME,
};

/// Settings key holding the global technician secret.
pub const TECHNICIAN_SECRET_KEY: &str = "technician_password";

/// Settings key holding a user's secret.
pub fn user_secret_key(user_id: &str) -> String {
  format!("user_password_{}", user_id)
}

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;
type ListenerRegistry = Arc<Mutex<Vec<(u64, Listener)>>>;

/// The single authority over who is signed in.
///
/// Constructed once by the composition root with its record store and
/// snapshot store, then shared by reference. Session-mutating operations are
/// serialized internally, so overlapping calls queue instead of racing.
///
/// Operations never fail with anything outside [`AuthError`]; unexpected
/// storage errors are downgraded to [`AuthError::Connection`] at the
/// boundary.
pub struct SessionManager<S: RecordStore> {
  store: Arc<S>,
  snapshots: SnapshotStore,
  state: Mutex<SessionState>,
  listeners: ListenerRegistry,
  next_listener_id: AtomicU64,
  /// Serializes session-mutating operations; the flag records whether
  /// `initialize` has already run.
  op_lock: tokio::sync::Mutex<bool>,
}

impl<S: RecordStore> SessionManager<S> {
  pub fn new(store: Arc<S>, snapshots: SnapshotStore) -> Self {
    Self {
      store,
      snapshots,
      state: Mutex::new(SessionState::loading()),
      listeners: Arc::new(Mutex::new(Vec::new())),
      next_listener_id: AtomicU64::new(0),
      op_lock: tokio::sync::Mutex::new(false),
    }
  }

  /// Restore a previously persisted session.
  ///
  /// Runs at most once per manager; later calls return the current state.
  /// A missing or corrupt snapshot resolves to the signed-out state, never
  /// to an error. Subscribers are notified once the state is resolved.
  pub async fn initialize(&self) -> SessionState {
    let mut initialized = self.op_lock.lock().await;
    if *initialized {
      return self.state();
    }
    *initialized = true;

    let next = match self.snapshots.load() {
      Some(user) => {
        debug!(username = %user.username, "restored session from snapshot");
        SessionState::authenticated(user)
      }
      None => SessionState::signed_out(),
    };
    self.set_state(next);
    self.notify();

    self.state()
  }

  /// Authenticate against the record store.
  ///
  /// Subscribers see two announcements: a leading one with `is_loading`
  /// set, and exactly one terminal announcement whatever the outcome. A
  /// failed attempt reports the failure but does not tear down a previously
  /// authenticated session.
  pub async fn login(&self, credentials: &LoginCredentials) -> Result<(), AuthError> {
    let _guard = self.op_lock.lock().await;

    {
      let mut state = lock_state(&self.state);
      state.is_loading = true;
    }
    self.notify();

    let outcome = match self.try_login(credentials) {
      Ok(user) => match self.snapshots.save(&user) {
        Ok(()) => Ok(user),
        Err(err) => Err(AuthError::connection(err)),
      },
      Err(err) => Err(err),
    };

    // Terminal announcement, exactly once, on every path.
    match &outcome {
      Ok(user) => {
        debug!(username = %user.username, "login succeeded");
        self.set_state(SessionState::authenticated(user.clone()));
      }
      Err(err) => {
        debug!("login failed: {}", err);
        let mut state = lock_state(&self.state);
        state.is_loading = false;
      }
    }
    self.notify();

    outcome.map(|_| ())
  }

  /// Create a new auditor account.
  ///
  /// Registration only creates the account and its credential; it does not
  /// sign the new user in. The created role is always `auditor`.
  pub async fn register(&self, user_data: NewUser) -> Result<User, AuthError> {
    let _guard = self.op_lock.lock().await;

    let outcome = self.try_register(&user_data);
    self.notify();

    outcome
  }

  /// Sign out unconditionally: clear the session state, remove the
  /// persisted snapshot and notify subscribers, whether or not a session
  /// was active.
  pub async fn logout(&self) {
    let _guard = self.op_lock.lock().await;

    self.set_state(SessionState::signed_out());
    if let Err(err) = self.snapshots.clear() {
      warn!("Failed to remove session snapshot: {}", err);
    }
    self.notify();
  }

  /// Register a listener for state changes. The returned subscription
  /// unsubscribes when dropped or via [`Subscription::unsubscribe`].
  pub fn subscribe<F>(&self, listener: F) -> Subscription
  where
    F: Fn(&SessionState) + Send + Sync + 'static,
  {
    let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
    let mut listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
    listeners.push((id, Arc::new(listener)));

    Subscription {
      listeners: Arc::downgrade(&self.listeners),
      id,
    }
  }

  /// Current session state.
  pub fn state(&self) -> SessionState {
    lock_state(&self.state).clone()
  }

  /// Whether the signed-in user is the technician.
  pub fn is_technician(&self) -> bool {
    lock_state(&self.state)
      .user
      .as_ref()
      .map(|user| user.role == Role::Technician)
      .unwrap_or(false)
  }

  fn try_login(&self, credentials: &LoginCredentials) -> Result<User, AuthError> {
    if credentials.username == TECHNICIAN_USERNAME {
      self.technician_login(&credentials.password)
    } else {
      self.standard_login(credentials)
    }
  }

  /// The technician signs in against a single global secret, not a per-user
  /// one. The secret is checked before the account record is loaded; a
  /// matching secret with no account record is still a failed login, never a
  /// session without a user.
  fn technician_login(&self, password: &str) -> Result<User, AuthError> {
    let stored = self
      .store
      .get_setting(TECHNICIAN_SECRET_KEY)
      .map_err(AuthError::connection)?;
    let verified = stored
      .as_deref()
      .map(|hash| verify_secret(password, hash))
      .unwrap_or(false);
    if !verified {
      return Err(AuthError::InvalidCredential);
    }

    match self
      .store
      .get_user_by_username(TECHNICIAN_USERNAME)
      .map_err(AuthError::connection)?
    {
      Some(user) => Ok(user),
      None => {
        warn!("technician secret matched but no technician account exists");
        Err(AuthError::InvalidCredential)
      }
    }
  }

  fn standard_login(&self, credentials: &LoginCredentials) -> Result<User, AuthError> {
    let mut user = self
      .store
      .get_user_by_username(&credentials.username)
      .map_err(AuthError::connection)?
      .ok_or_else(|| AuthError::UserNotFound {
        username: credentials.username.clone(),
      })?;

    let stored = self
      .store
      .get_setting(&user_secret_key(&user.id))
      .map_err(AuthError::connection)?;
    let verified = stored
      .as_deref()
      .map(|hash| verify_secret(&credentials.password, hash))
      .unwrap_or(false);
    if !verified {
      return Err(AuthError::InvalidCredential);
    }

    user.last_login = Some(Utc::now());
    self.store.update_user(&user).map_err(AuthError::connection)?;

    Ok(user)
  }

  fn try_register(&self, user_data: &NewUser) -> Result<User, AuthError> {
    let existing = self
      .store
      .get_user_by_username(&user_data.username)
      .map_err(AuthError::connection)?;
    if existing.is_some() {
      return Err(AuthError::DuplicateUsername {
        username: user_data.username.clone(),
      });
    }

    let hash = hash_secret(&user_data.password).map_err(AuthError::connection)?;

    let user = User {
      id: format!("user_{}", Uuid::new_v4()),
      username: user_data.username.clone(),
      // Registration can only mint auditors
      role: Role::Auditor,
      name: user_data.name.clone(),
      email: user_data.email.clone(),
      created_at: Utc::now(),
      last_login: None,
    };

    self.store.create_user(&user).map_err(AuthError::connection)?;
    self
      .store
      .set_setting(&user_secret_key(&user.id), &hash)
      .map_err(AuthError::connection)?;

    debug!(username = %user.username, "registered new auditor");
    Ok(user)
  }

  fn set_state(&self, next: SessionState) {
    *lock_state(&self.state) = next;
  }

  /// Announce the current state to every subscriber, in subscription order.
  /// The registry is snapshotted first so a listener may subscribe or
  /// unsubscribe from inside its callback.
  fn notify(&self) {
    let state = self.state();
    let listeners: Vec<Listener> = {
      let registry = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
      registry.iter().map(|(_, l)| Arc::clone(l)).collect()
    };
    for listener in listeners {
      listener(&state);
    }
  }
}

fn lock_state(state: &Mutex<SessionState>) -> std::sync::MutexGuard<'_, SessionState> {
  state.lock().unwrap_or_else(|p| p.into_inner())
}

/// Handle for an active state subscription.
pub struct Subscription {
  listeners: Weak<Mutex<Vec<(u64, Listener)>>>,
  id: u64,
}

impl Subscription {
  /// Stop receiving notifications. Dropping the subscription does the same.
  pub fn unsubscribe(self) {}

  fn remove(&self) {
    if let Some(listeners) = self.listeners.upgrade() {
      let mut listeners = listeners.lock().unwrap_or_else(|p| p.into_inner());
      listeners.retain(|(id, _)| *id != self.id);
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.remove();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::SqliteStore;
  use std::sync::atomic::AtomicUsize;
  use tempfile::TempDir;

  fn manager() -> (SessionManager<SqliteStore>, Arc<SqliteStore>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let snapshots = SnapshotStore::new(dir.path().join("session.json"));
    (SessionManager::new(Arc::clone(&store), snapshots), store, dir)
  }

  fn new_user(username: &str) -> NewUser {
    NewUser {
      username: username.to_string(),
      password: "hunter-green-42".to_string(),
      name: "Test Auditor".to_string(),
      email: None,
    }
  }

  fn creds(username: &str, password: &str) -> LoginCredentials {
    LoginCredentials {
      username: username.to_string(),
      password: password.to_string(),
    }
  }

  #[tokio::test]
  async fn test_register_then_login() {
    let (sessions, _store, _dir) = manager();
    sessions.initialize().await;

    sessions.register(new_user("ines")).await.unwrap();
    assert!(!sessions.state().is_authenticated, "register must not sign in");

    sessions
      .login(&creds("ines", "hunter-green-42"))
      .await
      .unwrap();

    let state = sessions.state();
    assert!(state.is_authenticated);
    let user = state.user.unwrap();
    assert_eq!(user.username, "ines");
    assert_eq!(user.role, Role::Auditor);
    assert!(user.last_login.is_some());
  }

  #[tokio::test]
  async fn test_login_wrong_password() {
    let (sessions, _store, _dir) = manager();
    sessions.initialize().await;
    sessions.register(new_user("ines")).await.unwrap();

    let err = sessions
      .login(&creds("ines", "wrong"))
      .await
      .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredential));
    assert!(!sessions.state().is_authenticated);
    assert!(!sessions.state().is_loading);
  }

  #[tokio::test]
  async fn test_login_unknown_user() {
    let (sessions, _store, _dir) = manager();
    sessions.initialize().await;

    let err = sessions
      .login(&creds("nobody", "whatever"))
      .await
      .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound { .. }));
  }

  #[tokio::test]
  async fn test_register_duplicate_username() {
    let (sessions, store, _dir) = manager();
    sessions.initialize().await;

    let first = sessions.register(new_user("ines")).await.unwrap();
    let err = sessions.register(new_user("ines")).await.unwrap_err();
    assert!(matches!(err, AuthError::DuplicateUsername { .. }));

    // Exactly the first account exists afterward
    let loaded = store.get_user_by_username("ines").unwrap().unwrap();
    assert_eq!(loaded.id, first.id);
  }

  #[tokio::test]
  async fn test_registration_stores_hash_not_plaintext() {
    let (sessions, store, _dir) = manager();
    sessions.initialize().await;

    let user = sessions.register(new_user("ines")).await.unwrap();
    let stored = store
      .get_setting(&user_secret_key(&user.id))
      .unwrap()
      .unwrap();
    assert!(stored.starts_with("$argon2"));
    assert_ne!(stored, "hunter-green-42");
  }

  #[tokio::test]
  async fn test_logout_clears_snapshot_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("session.json");
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    let sessions =
      SessionManager::new(Arc::clone(&store), SnapshotStore::new(snapshot_path.clone()));
    sessions.initialize().await;
    sessions.register(new_user("ines")).await.unwrap();
    sessions
      .login(&creds("ines", "hunter-green-42"))
      .await
      .unwrap();
    assert!(snapshot_path.exists());

    // A second manager over the same snapshot restores the session
    let restored =
      SessionManager::new(Arc::clone(&store), SnapshotStore::new(snapshot_path.clone()));
    let state = restored.initialize().await;
    assert!(state.is_authenticated);

    sessions.logout().await;
    assert!(!snapshot_path.exists());
    assert!(!sessions.state().is_authenticated);

    let fresh = SessionManager::new(Arc::clone(&store), SnapshotStore::new(snapshot_path));
    let state = fresh.initialize().await;
    assert!(!state.is_authenticated);
    assert!(state.user.is_none());
  }

  #[tokio::test]
  async fn test_corrupt_snapshot_initializes_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("session.json");
    std::fs::write(&snapshot_path, "garbage").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sessions = SessionManager::new(store, SnapshotStore::new(snapshot_path));
    let state = sessions.initialize().await;
    assert!(!state.is_authenticated);
    assert!(!state.is_loading);
  }

  #[tokio::test]
  async fn test_initialize_runs_once() {
    let (sessions, _store, _dir) = manager();
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let _sub = sessions.subscribe(move |_| {
      seen.fetch_add(1, Ordering::SeqCst);
    });

    sessions.initialize().await;
    sessions.initialize().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_technician_login_without_account_fails() {
    let (sessions, store, _dir) = manager();
    sessions.initialize().await;

    let hash = hash_secret("master-key").unwrap();
    store.set_setting(TECHNICIAN_SECRET_KEY, &hash).unwrap();

    // Secret matches but there is no technician account record
    let err = sessions
      .login(&creds(TECHNICIAN_USERNAME, "master-key"))
      .await
      .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredential));
    assert!(!sessions.state().is_authenticated);
    assert!(sessions.state().user.is_none());
  }

  #[tokio::test]
  async fn test_technician_login() {
    let (sessions, store, _dir) = manager();
    sessions.initialize().await;

    let hash = hash_secret("master-key").unwrap();
    store.set_setting(TECHNICIAN_SECRET_KEY, &hash).unwrap();
    store
      .create_user(&User {
        id: "user_technician".into(),
        username: TECHNICIAN_USERNAME.into(),
        role: Role::Technician,
        name: "Maintenance".into(),
        email: None,
        created_at: Utc::now(),
        last_login: None,
      })
      .unwrap();

    let err = sessions
      .login(&creds(TECHNICIAN_USERNAME, "wrong"))
      .await
      .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredential));
    assert!(!sessions.is_technician());

    sessions
      .login(&creds(TECHNICIAN_USERNAME, "master-key"))
      .await
      .unwrap();
    assert!(sessions.is_technician());
  }

  #[tokio::test]
  async fn test_notification_counts() {
    let (sessions, _store, _dir) = manager();
    sessions.initialize().await;
    sessions.register(new_user("ines")).await.unwrap();

    let announcements: Arc<Mutex<Vec<SessionState>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&announcements);
    let sub = sessions.subscribe(move |state| {
      sink.lock().unwrap().push(state.clone());
    });

    // Login: a loading announcement, then the terminal one
    sessions
      .login(&creds("ines", "hunter-green-42"))
      .await
      .unwrap();
    {
      let seen = announcements.lock().unwrap();
      assert_eq!(seen.len(), 2);
      assert!(seen[0].is_loading);
      assert!(!seen[1].is_loading);
      assert!(seen[1].is_authenticated);
    }

    // Failed login announces the same way
    let _ = sessions.login(&creds("ines", "wrong")).await;
    assert_eq!(announcements.lock().unwrap().len(), 4);

    // Logout: exactly one announcement, even with nothing signed in
    sessions.logout().await;
    sessions.logout().await;
    assert_eq!(announcements.lock().unwrap().len(), 6);

    // Register: exactly one terminal announcement
    sessions.register(new_user("marc")).await.unwrap();
    assert_eq!(announcements.lock().unwrap().len(), 7);

    sub.unsubscribe();
    sessions.logout().await;
    assert_eq!(announcements.lock().unwrap().len(), 7);
  }

  #[tokio::test]
  async fn test_failed_login_keeps_existing_session() {
    let (sessions, _store, _dir) = manager();
    sessions.initialize().await;
    sessions.register(new_user("ines")).await.unwrap();
    sessions
      .login(&creds("ines", "hunter-green-42"))
      .await
      .unwrap();

    let err = sessions.login(&creds("nobody", "x")).await.unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound { .. }));

    // The earlier session is still in place
    let state = sessions.state();
    assert!(state.is_authenticated);
    assert_eq!(state.user.unwrap().username, "ines");
  }
}
