// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Session identifiers and decoy field names.
//!
//! A session id is 256 bits from the OS CSPRNG, hex-encoded. The decoy
//! field name is a pure function of the id: a fixed prefix plus 128 bits of
//! a SHA3-256 digest over the id, so it neither exposes the id nor shrinks
//! the search space to a short slice of it.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Random bytes per session id.
pub const SESSION_ID_BYTES: usize = 32;
/// Hex length of an encoded session id.
pub const SESSION_ID_LEN: usize = SESSION_ID_BYTES * 2;
/// Prefix shared by every decoy field name.
pub const DECOY_PREFIX: &str = "_hp_";
/// Hex digits of digest appended to the decoy prefix.
pub const DECOY_HEX_LEN: usize = 32;
/// Shortest hex suffix still recognised as a decoy name.
pub const MIN_DECOY_SUFFIX_LEN: usize = 8;

/// Domain separator for decoy derivation.
const DECOY_CONTEXT: &[u8] = b"form-shield/decoy/v1";

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Draw a fresh id from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept a client-supplied id only if it has the issued shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == SESSION_ID_LEN
            && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decoy field name bound to this session.
    pub fn decoy_field_name(&self) -> String {
        decoy_field_name(self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Draw a new session id.
pub fn new_session_id() -> SessionId {
    SessionId::generate()
}

/// Derive the decoy field name for a session id.
pub fn decoy_field_name(id: &SessionId) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(DECOY_CONTEXT);
    hasher.update(id.as_str().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{DECOY_PREFIX}{}", &digest[..DECOY_HEX_LEN])
}

/// Whether a field name looks like a decoy from any session, current or
/// previously issued.
pub fn is_decoy_name(name: &str) -> bool {
    name.strip_prefix(DECOY_PREFIX).is_some_and(|suffix| {
        suffix.len() >= MIN_DECOY_SUFFIX_LEN && suffix.bytes().all(|b| b.is_ascii_hexdigit())
    })
}
