// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email pseudonymization and masking.
//!
//! ## Design
//!
//! `HMAC-SHA256(salt, NFC(trim(email)))` rendered as lowercase hex. The salt is
//! shared by every service so the same email always produces the same
//! [`PseudonymizedId`], which is the only form of the email that is stored or
//! placed in a token.
//!
//! Case is preserved: `Alice@x.io` and `alice@x.io` are distinct identities,
//! matching what the providers report.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

/// Stable lookup key derived from an email address (64 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PseudonymizedId(String);

impl PseudonymizedId {
    /// Wrap an already-derived value (e.g. read back from a token claim).
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PseudonymizedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyed one-way digest for personal identifiers.
#[derive(Clone)]
pub struct Pseudonymizer {
    salt: Vec<u8>,
}

impl Pseudonymizer {
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        Self {
            salt: salt.as_ref().to_vec(),
        }
    }

    /// Derive the lookup key for an identifier.
    ///
    /// Returns `None` (the absent sentinel) for empty or blank input.
    pub fn hash(&self, identifier: &str) -> Option<PseudonymizedId> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized: String = trimmed.nfc().collect();

        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.salt).ok()?;
        mac.update(normalized.as_bytes());
        Some(PseudonymizedId(hex::encode(mac.finalize().into_bytes())))
    }
}

impl fmt::Debug for Pseudonymizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pseudonymizer").finish_non_exhaustive()
    }
}

/// Mask an email for logs: `alice@example.com` becomes `a***@example.com`.
///
/// Inputs without an `@`, or with fewer than two characters before it,
/// collapse to `***`.
pub fn mask_email(email: &str) -> String {
    match email.find('@') {
        Some(at) if at > 1 => {
            let first = email.chars().next().unwrap_or('*');
            format!("{first}***{}", &email[at..])
        }
        _ => "***".to_string(),
    }
}
