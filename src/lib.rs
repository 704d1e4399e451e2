// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Form Shield
//!
//! Anti-automation gate for static-site form submissions:
//!
//! - Single-use sessions with a per-session honeypot (decoy) field
//! - Silent spam classification; bots are told they succeeded
//! - Fixed-window rate limiting per client identity
//! - Structural validation of business fields
//! - Hand-off of classified submissions to a durable sink
//!
//! Session creation fails closed when the backing store is down; the rate
//! limiter fails open.

pub mod config;
pub mod error;
pub mod fields;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod sink;
pub mod spam;
pub mod store;
pub mod token;
pub mod validator;

pub use config::Config;
pub use error::{AppError, StoreError};
pub use fields::FieldMap;
pub use limiter::{RateLimitResult, RateLimiter};
pub use orchestrator::{Classification, ClientInfo, SubmissionOrchestrator, SubmissionOutcome};
pub use session::{InvalidReason, SessionManager, SessionRecord, SessionValidation};
pub use sink::{ClassifiedSubmission, JsonLinesSink, MemorySink, SubmissionSink};
pub use store::{KeyValueStore, MemoryStore, SharedStore};
pub use token::SessionId;
pub use validator::{FormValidator, ValidationResult};
