// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Stateless identity propagation across the gateway, identity and banking
//! services.
//!
//! ## Auth Flow
//!
//! 1. The identity service completes a social login and sets the
//!    `jwt-token` and `refresh-token` cookies (HS256, shared secret).
//! 2. The gateway's [`edge`] filter verifies the token once, forwards
//!    `x-user-*` headers and re-attaches the bearer token.
//! 3. Each service's [`middleware`] verifies the same raw token again and
//!    builds the request's [`Principal`]. Forwarded headers are never used
//!    for authorization.
//!
//! ## Security
//!
//! - Failure reasons are logged, never returned.
//! - Zero clock-skew leeway on expiry.
//! - No replay tracking: a token is valid until it expires.

pub mod claims;
pub mod cookies;
pub mod edge;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod roles;
pub mod tokens;

pub use claims::{AccessClaims, Principal, RefreshClaims};
pub use error::AuthError;
pub use extractor::Auth;
pub use middleware::{enforce_access_policy, local_authenticate, AccessPolicy};
pub use roles::Role;
pub use tokens::{IssuedTokens, TokenError, TokenService};
