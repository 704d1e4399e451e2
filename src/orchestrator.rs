// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Submission pipeline.
//!
//! Rate limit, then session, then honeypot, then field validation, then
//! hand-off to the sink. Each stage short-circuits to its own
//! classification.
//!
//! A spam submission still consumes its token and is reported to the
//! submitter exactly like a legitimate one.

use crate::config::{Config, SecurityConfig};
use crate::fields::FieldMap;
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::session::{InvalidReason, SessionManager};
use crate::sink::{ClassifiedSubmission, SubmissionSink};
use crate::spam;
use crate::store::SharedStore;
use crate::token::is_decoy_name;
use crate::validator::{FormValidator, ValidationError, ValidationResult};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Final classification of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    Legitimate,
    Spam,
    SessionInvalid,
    RateLimited,
    ValidationFailed,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legitimate => "legitimate",
            Self::Spam => "spam",
            Self::SessionInvalid => "session_invalid",
            Self::RateLimited => "rate_limited",
            Self::ValidationFailed => "validation_failed",
        }
    }
}

/// Who sent a submission.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// Rate-limit key, normally the client IP
    pub identity: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Per-request result. Never persisted by this crate.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// What the submitter is told; true for spam as well as legitimate
    pub accepted: bool,
    pub classification: Classification,
    pub session_id: Option<String>,
    pub reason: Option<String>,
    pub invalid_reason: Option<InvalidReason>,
    pub validation_errors: Vec<ValidationError>,
    pub rate_limit: RateLimitResult,
    /// Whether the sink took the record
    pub delivered: bool,
}

impl SubmissionOutcome {
    fn new(
        classification: Classification,
        session_id: Option<&str>,
        rate_limit: RateLimitResult,
    ) -> Self {
        Self {
            accepted: matches!(
                classification,
                Classification::Legitimate | Classification::Spam
            ),
            classification,
            session_id: session_id.map(str::to_string),
            reason: None,
            invalid_reason: None,
            validation_errors: Vec::new(),
            rate_limit,
            delivered: false,
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Composes limiter, sessions, spam detector, validator and sink.
pub struct SubmissionOrchestrator {
    limiter: RateLimiter,
    sessions: Arc<SessionManager>,
    validator: FormValidator,
    sink: Arc<dyn SubmissionSink>,
    security: SecurityConfig,
}

impl SubmissionOrchestrator {
    pub fn new(
        limiter: RateLimiter,
        sessions: Arc<SessionManager>,
        validator: FormValidator,
        sink: Arc<dyn SubmissionSink>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            limiter,
            sessions,
            validator,
            sink,
            security,
        }
    }

    /// Wire every component from configuration onto one shared store.
    pub fn from_config(
        store: SharedStore,
        sink: Arc<dyn SubmissionSink>,
        config: &Config,
    ) -> Self {
        let timeout = config.store.timeout();
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            config.session.clone(),
            timeout,
        ));
        Self::new(
            RateLimiter::new(store, config.rate_limit.clone(), timeout),
            sessions,
            FormValidator::new(config.validation.clone()),
            sink,
            config.security.clone(),
        )
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn validator(&self) -> &FormValidator {
        &self.validator
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    /// Session id as carried in the field map.
    pub fn session_id_from<'a>(&self, fields: &'a FieldMap) -> Option<&'a str> {
        fields.get(&self.security.session_field)
    }

    /// Run one submission through the pipeline.
    pub async fn handle_submission(
        &self,
        fields: &FieldMap,
        session_id: Option<&str>,
        client: &ClientInfo,
    ) -> SubmissionOutcome {
        let rate_limit = self.admit(client).await;
        if !rate_limit.is_allowed() {
            return Self::rate_limited(rate_limit);
        }
        self.process(fields, session_id, client, rate_limit).await
    }

    /// Count one submission attempt against the client's limit.
    ///
    /// Runs before the body is even decoded, so malformed floods are
    /// throttled too.
    pub async fn admit(&self, client: &ClientInfo) -> RateLimitResult {
        let rate_limit = self.limiter.consume(&client.identity).await;
        if !rate_limit.is_allowed() {
            info!(identity = %client.identity, "Submission rate limited");
        }
        rate_limit
    }

    /// Outcome for a client [`Self::admit`] turned away.
    pub fn rate_limited(rate_limit: RateLimitResult) -> SubmissionOutcome {
        SubmissionOutcome::new(Classification::RateLimited, None, rate_limit)
            .with_reason("rate limit exceeded")
    }

    /// Session, honeypot, validation and hand-off for an admitted
    /// submission. `rate_limit` is the result [`Self::admit`] returned.
    pub async fn process(
        &self,
        fields: &FieldMap,
        session_id: Option<&str>,
        client: &ClientInfo,
        rate_limit: RateLimitResult,
    ) -> SubmissionOutcome {
        let record = match session_id {
            Some(id) => self.sessions.get_session(id).await,
            None => None,
        };
        let validation = self.sessions.validate(session_id, record.as_ref());
        let (Some(id), Some(record)) = (session_id, record.filter(|_| validation.is_valid())) else {
            let reason = validation.reason().unwrap_or(InvalidReason::InvalidOrExpired);
            if let Some(id) = session_id {
                self.sessions.record_failed_attempt(id).await;
            }
            info!(identity = %client.identity, reason = reason.code(), "Session rejected");
            return self.session_invalid(session_id, reason, rate_limit);
        };

        if self.security.honeypot_enabled {
            if let Some(signal) = spam::detect(fields, &record.decoy_field_name) {
                // Burn the token so the bot cannot simply retry
                self.sessions
                    .mark_used(id, client.ip.as_deref(), client.user_agent.as_deref())
                    .await;
                info!(
                    session_id = id,
                    identity = %client.identity,
                    %signal,
                    "Spam submission detected"
                );

                let mut outcome =
                    SubmissionOutcome::new(Classification::Spam, Some(id), rate_limit)
                        .with_reason(signal.to_string());
                outcome.delivered = self.deliver(fields, id, true, client).await;
                return outcome;
            }
        }

        if let ValidationResult::Invalid(errors) =
            self.validator.validate_fields(fields, &self.security.session_field)
        {
            self.sessions.record_failed_attempt(id).await;
            debug!(session_id = id, errors = ?errors, "Submission failed validation");
            let mut outcome =
                SubmissionOutcome::new(Classification::ValidationFailed, Some(id), rate_limit)
                    .with_reason("field validation failed");
            outcome.validation_errors = errors;
            return outcome;
        }

        if !self
            .sessions
            .mark_used(id, client.ip.as_deref(), client.user_agent.as_deref())
            .await
        {
            // Another request used this token between validation and now
            return self.session_invalid(Some(id), InvalidReason::AlreadySubmitted, rate_limit);
        }

        let mut outcome = SubmissionOutcome::new(Classification::Legitimate, Some(id), rate_limit);
        outcome.delivered = self.deliver(fields, id, false, client).await;
        info!(session_id = id, "Submission accepted");
        outcome
    }

    fn session_invalid(
        &self,
        session_id: Option<&str>,
        reason: InvalidReason,
        rate_limit: RateLimitResult,
    ) -> SubmissionOutcome {
        let mut outcome =
            SubmissionOutcome::new(Classification::SessionInvalid, session_id, rate_limit)
                .with_reason(reason.to_string());
        outcome.invalid_reason = Some(reason);
        outcome
    }

    async fn deliver(
        &self,
        fields: &FieldMap,
        session_id: &str,
        is_spam: bool,
        client: &ClientInfo,
    ) -> bool {
        let session_field = self.security.session_field.as_str();
        let submission = ClassifiedSubmission {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            is_spam,
            fields: fields.without(|name| name == session_field || is_decoy_name(name)),
            client_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            received_at: Utc::now(),
        };
        let submission_id = submission.id;

        match self.sink.record(submission).await {
            Ok(()) => true,
            Err(e) => {
                error!(%submission_id, session_id, error = %e, "Failed to hand off submission");
                false
            }
        }
    }
}
