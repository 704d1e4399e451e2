// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bounded, ordered container for client-submitted form fields.

use crate::config::FieldLimits;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("too many fields: {count} exceeds limit of {max}")]
    TooManyFields { count: usize, max: usize },

    #[error("empty field name")]
    EmptyName,

    #[error("field name exceeds {max} characters")]
    NameTooLong { max: usize },

    #[error("value of field {name} exceeds {max} characters")]
    ValueTooLong { name: String, max: usize },
}

/// Flat field map preserving submission order. Duplicate names are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    /// Build a map, rejecting anything outside `limits`.
    pub fn from_pairs<I, K, V>(pairs: I, limits: &FieldLimits) -> Result<Self, FieldError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = Vec::new();
        for (name, value) in pairs {
            if entries.len() == limits.max_fields {
                return Err(FieldError::TooManyFields {
                    count: entries.len() + 1,
                    max: limits.max_fields,
                });
            }
            let name = name.into();
            let value = value.into();
            if name.is_empty() {
                return Err(FieldError::EmptyName);
            }
            if name.chars().count() > limits.max_name_len {
                return Err(FieldError::NameTooLong {
                    max: limits.max_name_len,
                });
            }
            if value.chars().count() > limits.max_value_len {
                return Err(FieldError::ValueTooLong {
                    name,
                    max: limits.max_value_len,
                });
            }
            entries.push((name, value));
        }
        Ok(Self { entries })
    }

    /// First value submitted under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value submitted under `name`.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the map without the entries `drop` selects.
    pub fn without(&self, mut drop: impl FnMut(&str) -> bool) -> FieldMap {
        FieldMap {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| !drop(k))
                .cloned()
                .collect(),
        }
    }
}
