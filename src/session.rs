// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Session lifecycle: issue, read, validate, use, invalidate.
//!
//! A session moves `Created -> Used` exactly once; expiry is left entirely
//! to the store TTL. Every read-modify-write goes through the store's
//! `compare_and_set`, so of two requests racing to use the same token only
//! the first write lands.
//!
//! Only [`SessionManager::create_session`] surfaces store failures. Every
//! other operation degrades to "absent" or a no-op.

use crate::config::SessionConfig;
use crate::error::StoreError;
use crate::store::{KeyValueStore, SharedStore, TimedStore};
use crate::token::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key prefix for session records.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Optimistic update attempts before giving up on a contended key.
const MAX_UPDATE_RETRIES: usize = 8;

pub fn session_key(id: &SessionId) -> String {
    format!("{SESSION_KEY_PREFIX}{id}")
}

/// Stored session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub decoy_field_name: String,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    #[serde(default)]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub client_user_agent: Option<String>,
}

impl SessionRecord {
    fn new(session_id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            decoy_field_name: session_id.decoy_field_name(),
            session_id,
            created_at: now,
            last_access_at: now,
            used_at: None,
            used: false,
            attempts: 0,
            client_ip: None,
            client_user_agent: None,
        }
    }
}

/// Why a session cannot accept a submission. Listed in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Required,
    InvalidOrExpired,
    AlreadySubmitted,
    TooManyAttempts,
}

impl InvalidReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Required => "SESSION_REQUIRED",
            Self::InvalidOrExpired => "SESSION_INVALID",
            Self::AlreadySubmitted => "SESSION_USED",
            Self::TooManyAttempts => "MAX_ATTEMPTS",
        }
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => write!(f, "Session token is required"),
            Self::InvalidOrExpired => write!(f, "Session is invalid or has expired"),
            Self::AlreadySubmitted => write!(f, "This form has already been submitted"),
            Self::TooManyAttempts => write!(f, "Too many attempts, please reload the form"),
        }
    }
}

/// Result of session validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionValidation {
    Valid,
    Invalid(InvalidReason),
}

impl SessionValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionValidation::Valid)
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            SessionValidation::Valid => None,
            SessionValidation::Invalid(reason) => Some(*reason),
        }
    }
}

/// Read-only view for status queries. Never carries client ip or agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_valid: bool,
    pub is_used: bool,
    pub attempts: u32,
    pub decoy_field_name: String,
}

/// Expiry to apply with a record write.
#[derive(Debug, Clone, Copy)]
enum Expiry {
    Arm(Duration),
    Keep,
}

enum Update {
    Absent,
    Skipped(SessionRecord),
    Applied(SessionRecord),
    Contended(SessionRecord),
}

/// Owns the session state machine on top of a shared store.
pub struct SessionManager {
    store: TimedStore,
    config: SessionConfig,
}

impl SessionManager {
    /// Every store call is bounded by `timeout`.
    pub fn new(store: SharedStore, config: SessionConfig, timeout: Duration) -> Self {
        Self {
            store: TimedStore::new(store, timeout),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Issue a new session. Store failures propagate: a form must never be
    /// served without a token.
    pub async fn create_session(&self) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(SessionId::generate(), Utc::now());
        let raw = serde_json::to_string(&record)?;

        self.store
            .set_ex(&session_key(&record.session_id), &raw, self.config.ttl())
            .await?;

        debug!(session_id = %record.session_id, "Session created");
        Ok(record)
    }

    /// Read a session, sliding its expiry while unused.
    ///
    /// Unknown, expired and never-issued ids all come back as `None`.
    pub async fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        let id = SessionId::parse(session_id)?;
        let ttl = self.config.ttl();

        let update = self
            .update(&id, |record| {
                if record.used {
                    return None;
                }
                record.last_access_at = Utc::now();
                Some(Expiry::Arm(ttl))
            })
            .await;

        match update {
            Ok(Update::Applied(r) | Update::Skipped(r) | Update::Contended(r)) => Some(r),
            Ok(Update::Absent) => None,
            Err(e) => {
                warn!(error = %e, "Session read failed, treating as absent");
                None
            }
        }
    }

    /// Read a session without touching its expiry.
    pub async fn peek_session(&self, session_id: &str) -> Option<SessionRecord> {
        let id = SessionId::parse(session_id)?;
        match self.load(&id).await {
            Ok(found) => found.map(|(_, record)| record),
            Err(e) => {
                warn!(error = %e, "Session peek failed, treating as absent");
                None
            }
        }
    }

    /// Decide whether a session may accept a submission.
    ///
    /// Checks run in a fixed order: missing id, absent record, already
    /// used, attempts exhausted. A forged or expired token is therefore
    /// rejected before its used state is considered.
    pub fn validate(
        &self,
        session_id: Option<&str>,
        record: Option<&SessionRecord>,
    ) -> SessionValidation {
        if session_id.map_or(true, |id| id.trim().is_empty()) {
            return SessionValidation::Invalid(InvalidReason::Required);
        }
        let Some(record) = record else {
            return SessionValidation::Invalid(InvalidReason::InvalidOrExpired);
        };
        if record.used {
            return SessionValidation::Invalid(InvalidReason::AlreadySubmitted);
        }
        if record.attempts >= self.config.max_attempts {
            return SessionValidation::Invalid(InvalidReason::TooManyAttempts);
        }
        SessionValidation::Valid
    }

    /// Status view for the introspection endpoint.
    pub async fn status(&self, session_id: &str) -> Option<SessionStatus> {
        let record = self.peek_session(session_id).await?;
        Some(SessionStatus {
            is_valid: self.validate(Some(session_id), Some(&record)).is_valid(),
            is_used: record.used,
            attempts: record.attempts,
            decoy_field_name: record.decoy_field_name,
        })
    }

    /// Count an invalid submission against the session. No-op if absent.
    pub async fn record_failed_attempt(&self, session_id: &str) {
        let Some(id) = SessionId::parse(session_id) else {
            return;
        };
        let ttl = self.config.ttl();

        let update = self
            .update(&id, |record| {
                record.attempts = record.attempts.saturating_add(1);
                // A used record runs out the audit window it was given at use
                Some(if record.used { Expiry::Keep } else { Expiry::Arm(ttl) })
            })
            .await;

        match update {
            Ok(Update::Applied(record)) => {
                debug!(session_id = %id, attempts = record.attempts, "Failed attempt recorded");
            }
            Ok(Update::Contended(_)) => {
                warn!(session_id = %id, "Failed attempt not recorded, key contended");
            }
            Ok(_) => {}
            Err(e) => warn!(session_id = %id, error = %e, "Failed attempt not recorded"),
        }
    }

    /// Mark the session used and shorten its lifetime to the audit window.
    ///
    /// Returns `true` only for the caller whose write made the transition;
    /// a concurrent second use of the same token gets `false`.
    pub async fn mark_used(
        &self,
        session_id: &str,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> bool {
        let Some(id) = SessionId::parse(session_id) else {
            return false;
        };
        let used_ttl = self.config.used_ttl();

        let update = self
            .update(&id, |record| {
                if record.used {
                    return None;
                }
                record.used = true;
                record.used_at = Some(Utc::now());
                record.client_ip = client_ip.map(str::to_string);
                record.client_user_agent = user_agent.map(str::to_string);
                Some(Expiry::Arm(used_ttl))
            })
            .await;

        match update {
            Ok(Update::Applied(_)) => {
                info!(session_id = %id, "Session used");
                true
            }
            Ok(Update::Skipped(_)) => {
                info!(session_id = %id, "Session already used by a concurrent request");
                false
            }
            Ok(Update::Contended(_)) => {
                warn!(session_id = %id, "Session use abandoned, key contended");
                false
            }
            Ok(Update::Absent) => false,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Session could not be marked used");
                false
            }
        }
    }

    /// Invalidate a session. Idempotent.
    pub async fn delete_session(&self, session_id: &str) {
        let Some(id) = SessionId::parse(session_id) else {
            return;
        };
        match self.store.delete(&session_key(&id)).await {
            Ok(existed) => debug!(session_id = %id, existed, "Session deleted"),
            Err(e) => warn!(session_id = %id, error = %e, "Session delete failed"),
        }
    }

    /// Load the raw and decoded record. Undecodable records count as absent.
    async fn load(&self, id: &SessionId) -> Result<Option<(String, SessionRecord)>, StoreError> {
        let Some(raw) = self.store.get(&session_key(id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some((raw, record))),
            Err(e) => {
                warn!(session_id = %id, error = %e, "Discarding undecodable session record");
                Ok(None)
            }
        }
    }

    /// Optimistic read-modify-write. `mutate` returns the expiry to apply,
    /// or `None` to leave the record untouched.
    async fn update<F>(&self, id: &SessionId, mut mutate: F) -> Result<Update, StoreError>
    where
        F: FnMut(&mut SessionRecord) -> Option<Expiry> + Send,
    {
        let key = session_key(id);
        let mut last_seen = None;

        for _ in 0..MAX_UPDATE_RETRIES {
            let Some((raw, current)) = self.load(id).await? else {
                return Ok(Update::Absent);
            };

            let mut next = current.clone();
            let Some(expiry) = mutate(&mut next) else {
                return Ok(Update::Skipped(current));
            };
            let ttl = match expiry {
                Expiry::Arm(ttl) => Some(ttl),
                Expiry::Keep => None,
            };

            let encoded = serde_json::to_string(&next)?;
            if self.store.compare_and_set(&key, &raw, &encoded, ttl).await? {
                return Ok(Update::Applied(next));
            }
            debug!(session_id = %id, "Session changed during update, retrying");
            last_seen = Some(current);
        }

        Ok(last_seen.map_or(Update::Absent, Update::Contended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::DownStore;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn manager_with(store: Arc<MemoryStore>) -> SessionManager {
        SessionManager::new(store, SessionConfig::default(), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());

        let created = manager.create_session().await.unwrap();
        assert!(!created.used);
        assert_eq!(created.attempts, 0);
        assert_eq!(created.decoy_field_name, created.session_id.decoy_field_name());

        let fetched = manager.get_session(created.session_id.as_str()).await.unwrap();
        assert_eq!(fetched.session_id, created.session_id);
        assert!(fetched.last_access_at >= created.last_access_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_rearms_full_ttl_while_unused() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let record = manager.create_session().await.unwrap();
        let key = session_key(&record.session_id);

        tokio::time::advance(Duration::from_secs(400)).await;
        assert!(manager.get_session(record.session_id.as_str()).await.is_some());
        assert_eq!(store.ttl(&key).await, Some(Duration::from_secs(600)));

        // 400s + 400s outlives a fixed 600s TTL but not a sliding one
        tokio::time::advance(Duration::from_secs(400)).await;
        assert!(manager.get_session(record.session_id.as_str()).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_without_reads() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store);
        let record = manager.create_session().await.unwrap();

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(manager.get_session(record.session_id.as_str()).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_are_absent() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        assert!(manager.get_session(&"a".repeat(64)).await.is_none());
        assert!(manager.get_session("not-a-session").await.is_none());
        assert!(manager.get_session("").await.is_none());
    }

    #[tokio::test]
    async fn test_validate_precedence() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let mut record = manager.create_session().await.unwrap();
        let id = record.session_id.to_string();

        assert_eq!(
            manager.validate(None, Some(&record)).reason(),
            Some(InvalidReason::Required)
        );
        assert_eq!(
            manager.validate(Some("  "), None).reason(),
            Some(InvalidReason::Required)
        );
        assert_eq!(
            manager.validate(Some(&id), None).reason(),
            Some(InvalidReason::InvalidOrExpired)
        );

        record.used = true;
        record.attempts = 99;
        assert_eq!(
            manager.validate(Some(&id), Some(&record)).reason(),
            Some(InvalidReason::AlreadySubmitted)
        );

        record.used = false;
        assert_eq!(
            manager.validate(Some(&id), Some(&record)).reason(),
            Some(InvalidReason::TooManyAttempts)
        );

        record.attempts = 4;
        assert!(manager.validate(Some(&id), Some(&record)).is_valid());
    }

    #[tokio::test]
    async fn test_failed_attempts_exhaust_session() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let record = manager.create_session().await.unwrap();
        let id = record.session_id.as_str();

        for _ in 0..manager.config().max_attempts {
            manager.record_failed_attempt(id).await;
        }

        let fetched = manager.get_session(id).await.unwrap();
        assert_eq!(fetched.attempts, 5);
        assert!(!fetched.used);
        assert_eq!(
            manager.validate(Some(id), Some(&fetched)),
            SessionValidation::Invalid(InvalidReason::TooManyAttempts)
        );
    }

    #[tokio::test]
    async fn test_record_failed_attempt_on_absent_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        manager.record_failed_attempt(&"b".repeat(64)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_used_once_and_shortens_ttl() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let record = manager.create_session().await.unwrap();
        let id = record.session_id.as_str();

        assert!(manager.mark_used(id, Some("203.0.113.9"), Some("curl/8")).await);
        assert!(!manager.mark_used(id, Some("198.51.100.1"), None).await);

        let used = manager.peek_session(id).await.unwrap();
        assert!(used.used);
        assert!(used.used_at.is_some());
        assert_eq!(used.client_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(used.client_user_agent.as_deref(), Some("curl/8"));
        assert_eq!(
            store.ttl(&session_key(&record.session_id)).await,
            Some(Duration::from_secs(300))
        );

        // Reads do not extend the audit window
        assert!(manager.get_session(id).await.is_some());
        assert_eq!(
            store.ttl(&session_key(&record.session_id)).await,
            Some(Duration::from_secs(300))
        );

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(manager.get_session(id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_on_used_session_keep_audit_deadline() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let record = manager.create_session().await.unwrap();
        let id = record.session_id.as_str();
        let key = session_key(&record.session_id);

        assert!(manager.mark_used(id, None, None).await);

        tokio::time::advance(Duration::from_secs(250)).await;
        manager.record_failed_attempt(id).await;
        assert_eq!(manager.peek_session(id).await.unwrap().attempts, 1);
        assert_eq!(store.ttl(&key).await, Some(Duration::from_secs(50)));

        tokio::time::advance(Duration::from_secs(51)).await;
        manager.record_failed_attempt(id).await;
        assert!(manager.peek_session(id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_rearms_unused_session() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let record = manager.create_session().await.unwrap();

        tokio::time::advance(Duration::from_secs(100)).await;
        manager.record_failed_attempt(record.session_id.as_str()).await;
        assert_eq!(
            store.ttl(&session_key(&record.session_id)).await,
            Some(Duration::from_secs(600))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mark_used_has_single_winner() {
        let manager = Arc::new(manager_with(Arc::new(MemoryStore::new())));
        let record = manager.create_session().await.unwrap();
        let id = record.session_id.to_string();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                let id = id.clone();
                tokio::spawn(async move { manager.mark_used(&id, None, None).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failed_attempts_are_all_counted() {
        let manager = Arc::new(manager_with(Arc::new(MemoryStore::new())));
        let record = manager.create_session().await.unwrap();
        let id = record.session_id.to_string();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                let id = id.clone();
                tokio::spawn(async move { manager.record_failed_attempt(&id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(manager.peek_session(&id).await.unwrap().attempts, 4);
    }

    #[tokio::test]
    async fn test_status_hides_client_details() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let record = manager.create_session().await.unwrap();
        let id = record.session_id.as_str();

        let status = manager.status(id).await.unwrap();
        assert!(status.is_valid);
        assert!(!status.is_used);
        assert_eq!(status.decoy_field_name, record.decoy_field_name);

        manager.mark_used(id, Some("203.0.113.9"), Some("agent")).await;
        let status = manager.status(id).await.unwrap();
        assert!(!status.is_valid);
        assert!(status.is_used);

        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("203.0.113.9"));
        assert!(!json.contains("agent"));
    }

    #[tokio::test]
    async fn test_delete_session_is_idempotent() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let record = manager.create_session().await.unwrap();
        let id = record.session_id.as_str();

        manager.delete_session(id).await;
        manager.delete_session(id).await;
        assert!(manager.get_session(id).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_absent() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let id = SessionId::generate();
        store
            .set_ex(&session_key(&id), "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(manager.get_session(id.as_str()).await.is_none());
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed_only_for_create() {
        let manager = SessionManager::new(
            Arc::new(DownStore),
            SessionConfig::default(),
            Duration::from_millis(50),
        );
        let id = "c".repeat(64);

        assert!(manager.create_session().await.is_err());
        assert!(manager.get_session(&id).await.is_none());
        assert!(!manager.mark_used(&id, None, None).await);
        manager.record_failed_attempt(&id).await;
        manager.delete_session(&id).await;
    }
}
