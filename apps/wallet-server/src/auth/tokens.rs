// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Service
//!
//! Issues and verifies HS256 identity tokens shared by all three services.
//!
//! - Access tokens carry display name, subject id, pseudonymized id and role.
//! - Refresh tokens carry only display name and subject id and live longer.
//!
//! `verify` is pure: no replay tracking, no state. A token stays usable
//! until `exp`, so logout only clears cookies.
//!
//! Failure reasons are kept apart in [`TokenError`] for logging. Callers
//! must collapse them into a single unauthorized outcome.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;

use super::claims::{AccessClaims, Principal, RefreshClaims, TokenKind};

/// Why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,

    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is of the wrong kind")]
    WrongType,

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl TokenError {
    /// Short reason for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::Empty => "empty",
            TokenError::Malformed => "malformed",
            TokenError::BadSignature => "bad_signature",
            TokenError::Expired => "expired",
            TokenError::WrongType => "wrong_type",
            TokenError::Signing(_) => "signing_failed",
        }
    }
}

/// Access and refresh token pair plus their lifetimes (cookie max-age).
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue an access/refresh pair for an identity.
    pub fn issue(&self, subject: &Principal) -> Result<IssuedTokens, TokenError> {
        Ok(IssuedTokens {
            access_token: self.issue_access(subject)?,
            refresh_token: self.issue_refresh(subject)?,
            access_ttl: self.access_ttl,
            refresh_ttl: self.refresh_ttl,
        })
    }

    pub fn issue_access(&self, subject: &Principal) -> Result<String, TokenError> {
        let iat = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: subject.display_name.clone(),
            uid: subject.subject_id,
            pseudo_id: subject.pseudonymized_id.as_str().to_string(),
            role: Some(subject.role.as_str().to_string()),
            typ: TokenKind::Access,
            iat,
            exp: iat + ttl_secs(self.access_ttl),
        };
        self.sign(&claims)
    }

    fn issue_refresh(&self, subject: &Principal) -> Result<String, TokenError> {
        let iat = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: subject.display_name.clone(),
            uid: subject.subject_id,
            typ: TokenKind::Refresh,
            iat,
            exp: iat + ttl_secs(self.refresh_ttl),
        };
        self.sign(&claims)
    }

    /// Verify an access token.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.decode_checked(token)?;
        if claims.typ != TokenKind::Access {
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }

    /// Verify a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode_checked(token)?;
        if claims.typ != TokenKind::Refresh {
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn decode_checked<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;

        decode::<T>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::crypto::PseudonymizedId;

    const SECRET: &[u8] = b"test-secret-key-with-at-least-32-bytes!!";

    fn service() -> TokenService {
        TokenService::new(SECRET, Duration::from_secs(3600), Duration::from_secs(7 * 86400))
    }

    fn alice() -> Principal {
        Principal {
            subject_id: 42,
            display_name: "Alice".to_string(),
            pseudonymized_id: PseudonymizedId::from_raw("f".repeat(64)),
            role: Role::User,
        }
    }

    fn sign_raw(claims: &serde_json::Value, secret: &[u8]) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn issue_then_verify_round_trips_identity() {
        let svc = service();
        let tokens = svc.issue(&alice()).unwrap();
        let claims = svc.verify(&tokens.access_token).unwrap();
        assert_eq!(Principal::from_claims(claims.clone()), alice());
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(tokens.refresh_ttl, Duration::from_secs(7 * 86400));
    }

    #[test]
    fn refresh_token_is_narrow_and_typed() {
        let svc = service();
        let tokens = svc.issue(&alice()).unwrap();
        let refresh = svc.verify_refresh(&tokens.refresh_token).unwrap();
        assert_eq!(refresh.uid, 42);
        assert_eq!(refresh.sub, "Alice");

        // Refresh tokens lack pseudoId, so they never pass as access tokens.
        assert!(svc.verify(&tokens.refresh_token).is_err());
        assert_eq!(svc.verify_refresh(&tokens.access_token), Err(TokenError::WrongType));
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now().timestamp();
        let token = sign_raw(
            &serde_json::json!({
                "sub": "Alice", "uid": 1, "pseudoId": "x", "role": "USER",
                "typ": "access", "iat": now - 120, "exp": now - 60
            }),
            SECRET,
        );
        assert_eq!(service().verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn expired_token_with_foreign_signature_is_still_rejected() {
        let now = Utc::now().timestamp();
        let token = sign_raw(
            &serde_json::json!({
                "sub": "Alice", "uid": 1, "pseudoId": "x", "typ": "access",
                "iat": now - 120, "exp": now - 60
            }),
            b"some-other-secret-entirely-different",
        );
        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn foreign_signature_is_bad_signature() {
        let other = TokenService::new(b"another-secret-key-of-sufficient-len", Duration::from_secs(60), Duration::from_secs(60));
        let token = other.issue_access(&alice()).unwrap();
        assert_eq!(service().verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn empty_and_garbage_tokens() {
        let svc = service();
        assert_eq!(svc.verify(""), Err(TokenError::Empty));
        assert_eq!(svc.verify("   "), Err(TokenError::Empty));
        assert_eq!(svc.verify("not.a.jwt"), Err(TokenError::Malformed));
        assert_eq!(svc.verify("abc"), Err(TokenError::Malformed));
    }

    #[test]
    fn verify_is_repeatable() {
        let svc = service();
        let token = svc.issue_access(&alice()).unwrap();
        for _ in 0..3 {
            assert!(svc.verify(&token).is_ok());
        }
    }

    #[test]
    fn reasons_are_distinct() {
        let reasons = [
            TokenError::Empty.reason(),
            TokenError::Malformed.reason(),
            TokenError::BadSignature.reason(),
            TokenError::Expired.reason(),
            TokenError::WrongType.reason(),
        ];
        for (i, a) in reasons.iter().enumerate() {
            for b in &reasons[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
