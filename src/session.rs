//! User accounts and session lifecycle.
//!
//! Accounts live in the document store at `users/{username}` with SHA-256
//! credential digests; the plaintext password never leaves `login`. The
//! active session persists to `~/.storekpi/session.json` so a fresh
//! invocation resumes it, and expires after a fixed quiet period.
//!
//! Expiry is gated on an in-flight operation counter: the watchdog never
//! clears a session while a batch holds an [`OperationGuard`], and the idle
//! clock restarts when the last guard drops. Without the gate, a slow batch
//! write could complete after its session was already cleared.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::store::{DocumentStore, StoreError};
use crate::types::{Config, Role, Session, UserAccount};

/// Poll interval for the expiry watchdog.
const WATCHDOG_POLL_SECS: u64 = 30;

/// Stock accounts seeded on first run, only when absent.
const DEFAULT_USERS: &[(&str, &str, Role, &str)] = &[
    ("admin", "Admin230049", Role::Admin, "Administrator"),
    ("4340", "SGM4340s**", Role::StoreManager, "Manager 4340"),
    ("4340s", "Store4340s", Role::Store, "Staff 4340"),
];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("User not found: {0}")]
    UnknownUser(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No active session")]
    NotLoggedIn,

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct SessionManager {
    store: Arc<dyn DocumentStore>,
    users_root: String,
    timeout: Duration,
    session_path: PathBuf,
    current: Mutex<Option<Session>>,
    ops_in_flight: AtomicUsize,
}

impl SessionManager {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config, session_path: PathBuf) -> Self {
        Self {
            store,
            users_root: config.users_root.clone(),
            timeout: Duration::minutes(config.session_timeout_minutes),
            session_path,
            current: Mutex::new(None),
            ops_in_flight: AtomicUsize::new(0),
        }
    }

    /// SHA-256 hex digest of a password.
    pub fn hash_password(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }

    fn user_path(&self, username: &str) -> String {
        format!("{}/{}", self.users_root, username)
    }

    /// Create the stock accounts, skipping any that already exist.
    /// Returns how many were created.
    pub async fn seed_default_users(&self) -> Result<usize, SessionError> {
        let mut created = 0;
        for (username, password, role, display_name) in DEFAULT_USERS {
            let path = self.user_path(username);
            if self.store.get(&path).await?.is_some() {
                continue;
            }
            let account = UserAccount {
                username: (*username).to_string(),
                password_sha256: Self::hash_password(password),
                role: *role,
                display_name: (*display_name).to_string(),
            };
            self.store
                .upsert_merge(&path, serde_json::to_value(&account)?)
                .await?;
            log::info!("Seeded user: {username}");
            created += 1;
        }
        Ok(created)
    }

    /// Check credentials and open a session. The session is persisted so a
    /// later invocation can resume it.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, SessionError> {
        let doc = self
            .store
            .get(&self.user_path(username))
            .await?
            .ok_or_else(|| SessionError::UnknownUser(username.to_string()))?;
        let account: UserAccount = serde_json::from_value(doc)?;

        if account.password_sha256 != Self::hash_password(password) {
            log::warn!("Login failed for {username}");
            return Err(SessionError::InvalidCredentials);
        }

        let now = Utc::now();
        let session = Session {
            username: account.username,
            role: account.role,
            display_name: account.display_name,
            login_at: now,
            last_active: now,
        };
        self.persist(&session)?;
        if let Ok(mut current) = self.current.lock() {
            *current = Some(session.clone());
        }
        log::info!("Login success: {} ({})", session.username, session.role.label());
        Ok(session)
    }

    /// Clear the active session and its persisted file.
    pub fn logout(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        if self.session_path.exists() {
            if let Err(e) = fs::remove_file(&self.session_path) {
                log::warn!("Failed to remove session file: {e}");
            }
        }
        log::info!("Logged out");
    }

    /// Resume a persisted session when one exists and has not gone idle
    /// past the timeout. An expired file is discarded.
    pub fn resume(&self, now: DateTime<Utc>) -> Option<Session> {
        let session = self.load_persisted()?;
        if now - session.last_active > self.timeout {
            log::info!("Stored session found but already expired");
            self.logout();
            return None;
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(session.clone());
        }
        log::info!("Resumed session for {}", session.username);
        Some(session)
    }

    fn load_persisted(&self) -> Option<Session> {
        let raw = fs::read_to_string(&self.session_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                log::warn!("Discarding unreadable session file: {e}");
                None
            }
        }
    }

    fn persist(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(parent) = self.session_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.session_path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }

    /// The active session, if any.
    pub fn current(&self) -> Option<Session> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    /// Refresh the idle clock. Called on user interaction.
    pub fn mark_activity(&self, now: DateTime<Utc>) {
        let updated = {
            let Ok(mut guard) = self.current.lock() else {
                return;
            };
            match guard.as_mut() {
                Some(session) => {
                    session.last_active = now;
                    Some(session.clone())
                }
                None => None,
            }
        };
        if let Some(session) = updated {
            if let Err(e) = self.persist(&session) {
                log::warn!("Failed to persist session activity: {e}");
            }
        }
    }

    /// Open an operation guard. While any guard is alive the session cannot
    /// expire; dropping the last one counts as activity.
    pub fn begin_operation(self: &Arc<Self>) -> OperationGuard {
        self.ops_in_flight.fetch_add(1, Ordering::SeqCst);
        OperationGuard {
            manager: Arc::clone(self),
        }
    }

    pub fn operations_in_flight(&self) -> usize {
        self.ops_in_flight.load(Ordering::SeqCst)
    }

    /// Expire the session when it has been idle past the timeout and no
    /// operation is in flight. Returns true when the session was cleared.
    pub fn tick(&self, now: DateTime<Utc>) -> bool {
        if self.operations_in_flight() > 0 {
            return false;
        }
        let expired = {
            let Ok(guard) = self.current.lock() else {
                return false;
            };
            match guard.as_ref() {
                Some(session) => now - session.last_active > self.timeout,
                None => false,
            }
        };
        if expired {
            log::info!(
                "Session expired (idle > {} minutes)",
                self.timeout.num_minutes()
            );
            self.logout();
        }
        expired
    }

    /// Watchdog loop for long-running mode: polls and expires idle
    /// sessions. Runs until the process exits.
    pub async fn run_watchdog(self: Arc<Self>) {
        loop {
            tokio::time::sleep(StdDuration::from_secs(WATCHDOG_POLL_SECS)).await;
            self.tick(Utc::now());
        }
    }
}

/// RAII token for an in-flight operation. Holding one defers session
/// expiry; dropping it marks activity so the idle clock restarts from the
/// operation's end, not its start.
pub struct OperationGuard {
    manager: Arc<SessionManager>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.manager.ops_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.manager.mark_activity(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> (tempfile::TempDir, Arc<SessionManager>) {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(SessionManager::new(
            Arc::new(MemoryStore::new()),
            &Config::default(),
            dir.path().join("session.json"),
        ));
        (dir, manager)
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let (_dir, manager) = manager();
        assert_eq!(manager.seed_default_users().await.unwrap(), 3);
        assert_eq!(manager.seed_default_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_login_success_and_session_fields() {
        let (_dir, manager) = manager();
        manager.seed_default_users().await.unwrap();

        let session = manager.login("4340", "SGM4340s**").await.unwrap();
        assert_eq!(session.role, Role::StoreManager);
        assert_eq!(session.display_name, "Manager 4340");
        assert!(manager.current().is_some());
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password() {
        let (_dir, manager) = manager();
        manager.seed_default_users().await.unwrap();

        let err = manager.login("4340", "wrong").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials));
        assert!(manager.current().is_none());

        let err = manager.login("nobody", "x").await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn test_no_plaintext_password_in_store() {
        let (_dir, manager) = manager();
        manager.seed_default_users().await.unwrap();

        let doc = manager.store.get("users/admin").await.unwrap().unwrap();
        let stored = doc.get("passwordSha256").and_then(|v| v.as_str()).unwrap();
        assert_ne!(stored, "Admin230049");
        assert_eq!(stored, SessionManager::hash_password("Admin230049"));
    }

    #[tokio::test]
    async fn test_resume_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let path = dir.path().join("session.json");

        let first = Arc::new(SessionManager::new(
            store.clone(),
            &Config::default(),
            path.clone(),
        ));
        first.seed_default_users().await.unwrap();
        first.login("4340s", "Store4340s").await.unwrap();

        // A second manager over the same session file resumes it.
        let second = SessionManager::new(store, &Config::default(), path);
        let resumed = second.resume(Utc::now()).unwrap();
        assert_eq!(resumed.username, "4340s");
    }

    #[tokio::test]
    async fn test_resume_discards_expired_session() {
        let (_dir, manager) = manager();
        manager.seed_default_users().await.unwrap();
        manager.login("4340s", "Store4340s").await.unwrap();

        // Eleven minutes later the stored session is stale.
        let later = Utc::now() + Duration::minutes(11);
        assert!(manager.resume(later).is_none());
        assert!(!manager.session_path.exists());
    }

    #[tokio::test]
    async fn test_tick_expires_idle_session() {
        let (_dir, manager) = manager();
        manager.seed_default_users().await.unwrap();
        manager.login("4340s", "Store4340s").await.unwrap();

        let later = Utc::now() + Duration::minutes(11);
        assert!(manager.tick(later));
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_tick_deferred_while_operation_in_flight() {
        let (_dir, manager) = manager();
        manager.seed_default_users().await.unwrap();
        manager.login("4340s", "Store4340s").await.unwrap();

        let guard = manager.begin_operation();
        let later = Utc::now() + Duration::minutes(11);
        assert!(!manager.tick(later));
        assert!(manager.current().is_some());

        // Dropping the guard counts as activity, so the session survives
        // the next tick too.
        drop(guard);
        assert_eq!(manager.operations_in_flight(), 0);
        assert!(!manager.tick(Utc::now() + Duration::minutes(1)));
        assert!(manager.current().is_some());
    }

    #[tokio::test]
    async fn test_mark_activity_refreshes_idle_clock() {
        let (_dir, manager) = manager();
        manager.seed_default_users().await.unwrap();
        manager.login("4340s", "Store4340s").await.unwrap();

        let later = Utc::now() + Duration::minutes(8);
        manager.mark_activity(later);
        // 11 minutes after login is only 3 after the last activity.
        assert!(!manager.tick(Utc::now() + Duration::minutes(11)));
        assert!(manager.current().is_some());
    }
}
