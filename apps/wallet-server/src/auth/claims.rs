// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the request-scoped principal.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;
use crate::crypto::PseudonymizedId;

/// Discriminates access tokens from refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by an access token (`jwt-token` cookie).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Display name.
    pub sub: String,
    /// Subject id (user number).
    pub uid: u64,
    /// Pseudonymized email.
    #[serde(rename = "pseudoId")]
    pub pseudo_id: String,
    /// Role name; absent or unknown values fall back to [`Role::User`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by a refresh token (`refresh-token` cookie).
///
/// Deliberately narrower: pseudonymized id and role are re-read from the
/// identity store when the token is redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub uid: u64,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// Identity established by re-verifying a token on this service.
///
/// Lives in request extensions; handlers get it through
/// [`Auth`](super::Auth).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Principal {
    pub subject_id: u64,
    pub display_name: String,
    pub pseudonymized_id: PseudonymizedId,
    pub role: Role,
}

impl Principal {
    pub fn from_claims(claims: AccessClaims) -> Self {
        let role = claims
            .role
            .as_deref()
            .and_then(Role::parse)
            .unwrap_or_default();
        Self {
            subject_id: claims.uid,
            display_name: claims.sub,
            pseudonymized_id: PseudonymizedId::from_raw(claims.pseudo_id),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Option<&str>) -> AccessClaims {
        AccessClaims {
            sub: "Alice".to_string(),
            uid: 7,
            pseudo_id: "ab".repeat(32),
            role: role.map(str::to_string),
            typ: TokenKind::Access,
            iat: 0,
            exp: 1,
        }
    }

    #[test]
    fn wire_names_match_cookie_contract() {
        let json = serde_json::to_value(claims(Some("USER"))).unwrap();
        assert_eq!(json["sub"], "Alice");
        assert_eq!(json["pseudoId"], "ab".repeat(32));
        assert_eq!(json["typ"], "access");
        assert!(json.get("pseudo_id").is_none());
    }

    #[test]
    fn principal_defaults_missing_role_to_user() {
        assert_eq!(Principal::from_claims(claims(None)).role, Role::User);
        assert_eq!(Principal::from_claims(claims(Some("bogus"))).role, Role::User);
        assert_eq!(Principal::from_claims(claims(Some("ADMIN"))).role, Role::Admin);
    }

    #[test]
    fn principal_copies_identity_fields() {
        let p = Principal::from_claims(claims(Some("USER")));
        assert_eq!(p.subject_id, 7);
        assert_eq!(p.display_name, "Alice");
        assert_eq!(p.pseudonymized_id.as_str(), "ab".repeat(32));
    }
}
