// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Structural validation of submitted form fields.
//!
//! - Content-Type validation
//! - Required field presence
//! - Email shape
//! - URL format for URL-typed fields
//! - Per-field length limits
//!
//! The session id field and decoy-shaped fields are not business fields and
//! are skipped.

use crate::config::ValidationConfig;
use crate::error::FieldIssue;
use crate::fields::FieldMap;
use crate::token::is_decoy_name;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Longest accepted email address (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid Content-Type: expected one of {expected:?}, got {actual:?}")]
    InvalidContentType {
        expected: Vec<String>,
        actual: Option<String>,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid email address in {0}")]
    InvalidEmail(String),

    #[error("Invalid URL format for {0}")]
    InvalidUrl(String),

    #[error("Field {field} exceeds {max} characters")]
    TooLong { field: String, max: usize },
}

impl ValidationError {
    /// Field-level detail for the submitter.
    pub fn issue(&self) -> FieldIssue {
        let (field, code) = match self {
            Self::InvalidContentType { .. } => ("content-type", "INVALID_CONTENT_TYPE"),
            Self::MissingField(f) => (f.as_str(), "REQUIRED"),
            Self::InvalidEmail(f) => (f.as_str(), "INVALID_EMAIL"),
            Self::InvalidUrl(f) => (f.as_str(), "INVALID_URL"),
            Self::TooLong { field, .. } => (field.as_str(), "TOO_LONG"),
        };
        FieldIssue {
            field: field.to_string(),
            code,
        }
    }
}

/// Result of validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Submission is valid
    Valid,
    /// Submission is invalid; every failing field is listed
    Invalid(Vec<ValidationError>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn errors(&self) -> &[ValidationError] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(errors) => errors,
        }
    }

    pub fn issues(&self) -> Vec<FieldIssue> {
        self.errors().iter().map(ValidationError::issue).collect()
    }
}

/// Form submission validator.
pub struct FormValidator {
    config: ValidationConfig,
}

impl FormValidator {
    /// Create a new validator with the given configuration.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate the Content-Type header.
    pub fn validate_content_type(&self, content_type: Option<&str>) -> ValidationResult {
        let ct = content_type.map(|s| {
            // Extract just the media type, ignoring charset etc.
            s.split(';').next().unwrap_or(s).trim().to_lowercase()
        });

        let accepted = self
            .config
            .accepted_content_types
            .iter()
            .any(|expected| ct.as_deref() == Some(expected.to_lowercase().as_str()));

        if accepted {
            ValidationResult::Valid
        } else {
            debug!(content_type = ?ct, "Content-Type invalid");
            ValidationResult::Invalid(vec![ValidationError::InvalidContentType {
                expected: self.config.accepted_content_types.clone(),
                actual: ct,
            }])
        }
    }

    /// Validate business fields. `session_field` names the token field,
    /// which is excluded along with every decoy-shaped field.
    pub fn validate_fields(&self, fields: &FieldMap, session_field: &str) -> ValidationResult {
        let business = fields.without(|name| name == session_field || is_decoy_name(name));
        let mut errors = Vec::new();

        for required in &self.config.required_fields {
            if business.get(required).map_or(true, |v| v.trim().is_empty()) {
                errors.push(ValidationError::MissingField(required.clone()));
            }
        }

        if let Some(email) = business.get(&self.config.email_field) {
            let email = email.trim();
            if !email.is_empty() && !is_valid_email(email) {
                errors.push(ValidationError::InvalidEmail(self.config.email_field.clone()));
            }
        }

        for field in &self.config.url_fields {
            if let Some(value) = business.get(field).map(str::trim) {
                if !value.is_empty() && !is_valid_http_url(value) {
                    errors.push(ValidationError::InvalidUrl(field.clone()));
                }
            }
        }

        let mut limited: Vec<_> = self.config.max_lengths.iter().collect();
        limited.sort();
        for (field, max) in limited {
            if business.get_all(field).any(|v| v.chars().count() > *max) {
                errors.push(ValidationError::TooLong {
                    field: field.clone(),
                    max: *max,
                });
            }
        }

        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            debug!(errors = errors.len(), "Field validation failed");
            ValidationResult::Invalid(errors)
        }
    }
}

/// Pragmatic email shape check: one `@`, non-empty local part, dotted
/// domain with non-empty labels, no whitespace.
fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}

/// Absolute http(s) URL with a host.
fn is_valid_http_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}
