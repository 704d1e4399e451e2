// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the form shield service.
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `FORM_SHIELD__*` environment variables (`__` separates nested keys, e.g.
//! `FORM_SHIELD__RATE_LIMIT__MAX_REQUESTS=50`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "FORM_SHIELD";

/// Configuration for the form shield service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub fields: FieldLimits,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Full TTL of an unused session, re-armed on every read (default: 600)
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// TTL kept after a session is used, for replay detection (default: 300)
    #[serde(default = "default_used_ttl_secs")]
    pub used_ttl_secs: u64,

    /// Invalid submissions tolerated per session (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Fixed-window rate limiting for the submission endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum submissions per client identity per window (default: 100)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds (default: 3600)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

/// Honeypot and client identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Run the decoy field check on submissions (default: true)
    #[serde(default = "default_true")]
    pub honeypot_enabled: bool,

    /// Name of the form field carrying the session id (default: sessionId)
    #[serde(default = "default_session_field")]
    pub session_field: String,

    /// Honour X-Forwarded-For from a loopback peer (default: false)
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

/// Bounds on client-submitted field maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldLimits {
    #[serde(default = "default_max_fields")]
    pub max_fields: usize,

    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
}

/// Structural validation of business fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Accepted request content types
    #[serde(default = "default_content_types")]
    pub accepted_content_types: Vec<String>,

    /// Fields that must be present and non-blank (default: ["email"])
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,

    /// Field validated as an email address, if present (default: email)
    #[serde(default = "default_email_field")]
    pub email_field: String,

    /// Fields validated as http(s) URLs, if present (default: ["website"])
    #[serde(default = "default_url_fields")]
    pub url_fields: Vec<String>,

    /// Per-field maximum lengths in characters
    #[serde(default = "default_max_lengths")]
    pub max_lengths: HashMap<String, usize>,
}

/// Backing store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on any single store call in milliseconds (default: 500)
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval between expired-key sweeps in seconds (default: 60)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// Where classified submissions are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Append-only JSON Lines file; submissions are kept in memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Cross-origin settings for the browser-side form script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_session_ttl_secs() -> u64 {
    600
}

fn default_used_ttl_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    3600
}

fn default_session_field() -> String {
    "sessionId".to_string()
}

fn default_max_fields() -> usize {
    50
}

fn default_max_name_len() -> usize {
    100
}

fn default_max_value_len() -> usize {
    10_000
}

fn default_content_types() -> Vec<String> {
    vec![
        "application/x-www-form-urlencoded".to_string(),
        "application/json".to_string(),
    ]
}

fn default_required_fields() -> Vec<String> {
    vec!["email".to_string()]
}

fn default_email_field() -> String {
    "email".to_string()
}

fn default_url_fields() -> Vec<String> {
    vec!["website".to_string()]
}

fn default_max_lengths() -> HashMap<String, usize> {
    HashMap::from([("name".to_string(), 200), ("message".to_string(), 5000)])
}

fn default_store_timeout_ms() -> u64 {
    500
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            security: SecurityConfig::default(),
            fields: FieldLimits::default(),
            validation: ValidationConfig::default(),
            store: StoreConfig::default(),
            sink: SinkConfig::default(),
            cors: CorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            used_ttl_secs: default_used_ttl_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            honeypot_enabled: default_true(),
            session_field: default_session_field(),
            trust_proxy_headers: false,
        }
    }
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            max_fields: default_max_fields(),
            max_name_len: default_max_name_len(),
            max_value_len: default_max_value_len(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            accepted_content_types: default_content_types(),
            required_fields: default_required_fields(),
            email_field: default_email_field(),
            url_fields: default_url_fields(),
            max_lengths: default_max_lengths(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .with_list_parse_key("validation.required_fields")
                    .with_list_parse_key("validation.url_fields")
                    .with_list_parse_key("validation.accepted_content_types")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn used_ttl(&self) -> Duration {
        Duration::from_secs(self.used_ttl_secs)
    }
}

impl RateLimitConfig {
    /// Get the rate window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
