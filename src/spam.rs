// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Honeypot spam detection.
//!
//! A submission is spam when the active session's decoy field carries a
//! value, or when any other decoy-shaped field does. The second check
//! catches scrapers replaying a cached page whose decoy name belongs to an
//! earlier session. Only decoy-shaped fields are ever inspected.

use crate::fields::FieldMap;
use crate::token::is_decoy_name;

/// Which decoy tripped the detector. Server-side detail only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamSignal {
    /// The decoy issued with the current session was filled
    ActiveDecoy,
    /// A decoy name from some other session was filled
    StaleDecoy,
}

impl std::fmt::Display for SpamSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ActiveDecoy => write!(f, "active decoy filled"),
            Self::StaleDecoy => write!(f, "stale decoy filled"),
        }
    }
}

fn filled(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Classify a submission against the active decoy name.
pub fn detect(fields: &FieldMap, active_decoy: &str) -> Option<SpamSignal> {
    if fields.get_all(active_decoy).any(filled) {
        return Some(SpamSignal::ActiveDecoy);
    }

    fields
        .iter()
        .any(|(name, value)| name != active_decoy && is_decoy_name(name) && filled(value))
        .then_some(SpamSignal::StaleDecoy)
}

/// Whether the submission was made by an automated filler.
pub fn is_spam(fields: &FieldMap, active_decoy: &str) -> bool {
    detect(fields, active_decoy).is_some()
}
