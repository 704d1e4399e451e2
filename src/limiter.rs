// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter for the submission endpoint.
//!
//! Each client identity owns a counter at `rate_limit:<identity>`. The
//! increment and TTL read happen in one store operation, and the window
//! TTL is armed only when the counter has none, so concurrent first
//! requests cannot both slip through or leave the counter immortal.
//!
//! Known limitation: a burst straddling a window boundary can admit up to
//! twice the nominal limit.
//!
//! If the store is unreachable the limiter fails open.

use crate::config::RateLimitConfig;
use crate::store::{KeyValueStore, SharedStore, TimedStore};
use std::time::Duration;
use tracing::{debug, warn};

/// Key prefix for rate-limit counters.
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Submissions seen in the current window, this one included
        count: u64,
        /// Remaining submissions in current window
        remaining: u32,
        /// Time until window resets
        reset_in: Duration,
    },
    /// Request is rate limited
    Limited {
        count: u64,
        /// Time until the window resets
        retry_after: Duration,
    },
    /// Backing store unreachable; request allowed without counting
    Degraded,
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateLimitResult::Limited { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RateLimitResult::Degraded)
    }

    /// Header values as `(limit, remaining, reset_secs)`, when counted.
    pub fn header_values(&self, limit: u32) -> Option<(u32, u32, u64)> {
        match self {
            Self::Allowed {
                remaining,
                reset_in,
                ..
            } => Some((limit, *remaining, ceil_secs(*reset_in))),
            Self::Limited { retry_after, .. } => Some((limit, 0, ceil_secs(*retry_after))),
            Self::Degraded => None,
        }
    }
}

/// Whole seconds, rounded up so a pending reset never reads as zero.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Per-identity fixed-window counter on a shared store.
pub struct RateLimiter {
    store: TimedStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Every store call is bounded by `timeout`.
    pub fn new(store: SharedStore, config: RateLimitConfig, timeout: Duration) -> Self {
        Self {
            store: TimedStore::new(store, timeout),
            config,
        }
    }

    pub fn limit(&self) -> u32 {
        self.config.max_requests
    }

    /// Count one submission for `identity` and decide whether it may proceed.
    pub async fn consume(&self, identity: &str) -> RateLimitResult {
        let key = format!("{RATE_LIMIT_KEY_PREFIX}{}", normalize_identity(identity));

        let window = match self
            .store
            .incr_window(&key, self.config.window_duration())
            .await
        {
            Ok(window) => window,
            Err(e) => {
                warn!(identity, error = %e, "Rate limiter store unavailable, failing open");
                return RateLimitResult::Degraded;
            }
        };

        let max = u64::from(self.config.max_requests);
        if window.count > max {
            debug!(
                identity,
                count = window.count,
                retry_after = ?window.ttl,
                "Identity rate limit exceeded"
            );
            return RateLimitResult::Limited {
                count: window.count,
                retry_after: window.ttl,
            };
        }

        if window.armed {
            debug!(identity, window = ?window.ttl, "Rate limit window opened");
        }

        RateLimitResult::Allowed {
            count: window.count,
            remaining: (max - window.count) as u32,
            reset_in: window.ttl,
        }
    }
}

/// Normalize a client identity for use as a counter key.
fn normalize_identity(identity: &str) -> String {
    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }
    match trimmed.parse::<std::net::IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => trimmed.to_lowercase(),
    }
}
