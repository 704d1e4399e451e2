// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the form shield service.
//!
//! Store faults are split by policy: session issuance surfaces
//! [`StoreError`] to its caller (fail closed), while the rate limiter and the
//! other session operations absorb it (fail open / absent).

use crate::limiter::ceil_secs;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Backing store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("value at {0} has the wrong type")]
    WrongType(String),

    #[error("stored value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable submission sink failure.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Field-level validation detail returned to the submitter.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub code: &'static str,
}

/// Error body returned by the HTTP layer.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldIssue>,
}

/// Failures surfaced at the API boundary.
///
/// Spam detection is deliberately absent: it is reported as success.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("service temporarily unavailable")]
    BackingStoreUnavailable(#[source] StoreError),

    #[error("session is invalid or has expired")]
    SessionNotFound,

    #[error("{message}")]
    SessionInvalid { code: &'static str, message: String },

    #[error("too many submissions, try again later")]
    RateLimited { retry_after: Duration },

    #[error("submission failed validation")]
    ValidationFailed(Vec<FieldIssue>),

    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BackingStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::SessionInvalid { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BackingStoreUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::SessionNotFound => "SESSION_INVALID",
            Self::SessionInvalid { code, .. } => code,
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::BadRequest(_) => "BAD_REQUEST",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let retry_after_secs = match &self {
            Self::RateLimited { retry_after } => Some(ceil_secs(*retry_after).max(1)),
            _ => None,
        };
        let error = self.to_string();
        let fields = match self {
            Self::ValidationFailed(fields) => fields,
            _ => Vec::new(),
        };

        let body = Json(ErrorResponse {
            success: false,
            error,
            code,
            retry_after_secs,
            fields,
        });

        match retry_after_secs {
            Some(secs) => (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response(),
            None => (status, body).into_response(),
        }
    }
}
