// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Key-value store with per-key expiry.
//!
//! Session state and rate-limit counters live behind [`KeyValueStore`] so
//! several server instances can share one backing store. All coordination
//! goes through the store's atomic primitives; nothing here is cached
//! in-process across requests.
//!
//! [`MemoryStore`] is the in-process backend. A networked backend must give
//! `compare_and_set` and `incr_window` the same single-operation semantics
//! (e.g. a server-side script).

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Counter state returned by [`KeyValueStore::incr_window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Counter value after the increment
    pub count: u64,
    /// Remaining lifetime of the counter
    pub ttl: Duration,
    /// Whether this increment armed the window
    pub armed: bool,
}

/// Shared store handle.
pub type SharedStore = Arc<dyn KeyValueStore>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value with a fresh TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Replace the value only if it is live and still equal to `expected`.
    /// `Some(ttl)` arms a fresh TTL, `None` keeps the current expiry.
    /// Returns `false` when the key changed or vanished.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Remove a key. Returns `false` if it was already absent.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Increment a counter and read its TTL in one indivisible step. The
    /// window TTL is armed only when the counter has none.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(u64),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }

    fn render(&self) -> String {
        match &self.value {
            Value::Text(s) => s.clone(),
            Value::Counter(n) => n.to_string(),
        }
    }
}

/// In-process TTL store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries (should be called periodically).
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Expired store entries removed");
        }
        removed
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining lifetime of a live key, `None` if absent or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.duration_since(now))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(Entry::render))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) && entry.render() == expected => {
                entry.value = Value::Text(value.to_string());
                if let Some(ttl) = ttl {
                    entry.expires_at = Some(now + ttl);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at: None,
        });

        let count = match &mut entry.value {
            Value::Counter(n) => {
                *n += 1;
                *n
            }
            Value::Text(_) => return Err(StoreError::WrongType(key.to_string())),
        };

        let armed = entry.expires_at.is_none();
        let expires_at = *entry.expires_at.get_or_insert(now + window);

        Ok(WindowCount {
            count,
            ttl: expires_at.duration_since(now),
            armed,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Bounds every call on the wrapped store with a timeout.
///
/// A timeout is reported as [`StoreError::Timeout`] and callers treat it
/// exactly like an unreachable store.
#[derive(Clone)]
pub struct TimedStore {
    inner: SharedStore,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: SharedStore, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl KeyValueStore for TimedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.bounded(self.inner.set_ex(key, value, ttl)).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.bounded(self.inner.compare_and_set(key, expected, value, ttl))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.bounded(self.inner.delete(key)).await
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        self.bounded(self.inner.incr_window(key, window)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.inner.ping()).await
    }
}

/// Store doubles shared by unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Every call fails as if the backing store were unreachable.
    pub(crate) struct DownStore;

    fn refused() -> StoreError {
        StoreError::Unavailable("connection refused".into())
    }

    #[async_trait]
    impl KeyValueStore for DownStore {
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(refused())
        }
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(refused())
        }
        async fn compare_and_set(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Option<Duration>,
        ) -> Result<bool, StoreError> {
            Err(refused())
        }
        async fn delete(&self, _: &str) -> Result<bool, StoreError> {
            Err(refused())
        }
        async fn incr_window(&self, _: &str, _: Duration) -> Result<WindowCount, StoreError> {
            Err(refused())
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(refused())
        }
    }
}
