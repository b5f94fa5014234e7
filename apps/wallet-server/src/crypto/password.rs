// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer password hashing (Argon2id, PHC string format).
//!
//! Only gates money movement. Identity itself comes from the social login.
//! Both operations are CPU-heavy on purpose; async callers should go through
//! [`PasswordVerifier::hash_blocking`] / [`PasswordVerifier::verify_blocking`].

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString};
use argon2::Argon2;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("password task failed: {0}")]
    Task(String),
}

#[derive(Clone, Default)]
pub struct PasswordVerifier {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for PasswordVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordVerifier(argon2id)")
    }
}

impl PasswordVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a secret with a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        if secret.is_empty() {
            return Err(PasswordError::Empty);
        }
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Check a secret against a stored verifier hash.
    ///
    /// A missing or unparsable hash never verifies.
    pub fn verify(&self, secret: &str, verifier_hash: Option<&str>) -> bool {
        let Some(stored) = verifier_hash.filter(|h| !h.is_empty()) else {
            return false;
        };
        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Stored password hash is unparsable");
                return false;
            }
        };
        self.argon2.verify_password(secret.as_bytes(), &parsed).is_ok()
    }

    pub async fn hash_blocking(&self, secret: String) -> Result<String, PasswordError> {
        let verifier = self.clone();
        tokio::task::spawn_blocking(move || verifier.hash(&secret))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    pub async fn verify_blocking(&self, secret: String, verifier_hash: Option<String>) -> bool {
        let verifier = self.clone();
        match tokio::task::spawn_blocking(move || verifier.verify(&secret, verifier_hash.as_deref())).await {
            Ok(matched) => matched,
            Err(e) => {
                warn!(error = %e, "Password verification task failed");
                false
            }
        }
    }
}
