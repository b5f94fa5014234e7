// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Prefix used when a role travels as a downstream header (`ROLE_USER`).
pub const ROLE_HEADER_PREFIX: &str = "ROLE_";

/// User roles for authorization.
///
/// Every social login starts as `User`. `Admin` is only ever granted by
/// editing the identity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Parse role from string (case-insensitive, optional `ROLE_` prefix).
    pub fn parse(s: &str) -> Option<Role> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix(ROLE_HEADER_PREFIX).unwrap_or(&upper) {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Claim value, e.g. `USER`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    /// Header value, e.g. `ROLE_USER`.
    pub fn authority(&self) -> String {
        format!("{ROLE_HEADER_PREFIX}{}", self.as_str())
    }
}
