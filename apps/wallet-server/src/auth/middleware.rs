// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Local Authenticator
//!
//! Service-side half of the trust chain. Every service behind the gateway
//! re-verifies the raw token itself:
//!
//! 1. [`local_authenticate`] extracts the token (bearer header first, then
//!    the `jwt-token` cookie), verifies signature and expiry, and stores a
//!    [`Principal`] in the request extensions. On failure the request simply
//!    continues unauthenticated.
//! 2. [`enforce_access_policy`] lets public paths through and answers every
//!    other unauthenticated request with a 401 JSON body.
//!
//! Apply them outermost-last so authentication runs first:
//!
//! ```rust,ignore
//! router
//!     .layer(from_fn_with_state(policy, enforce_access_policy))
//!     .layer(from_fn_with_state(tokens, local_authenticate))
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::cookies::token_header_first;
use super::edge::is_static_asset;
use super::{AuthError, Principal, TokenService};

/// Verify the request's token and attach the principal, if any.
pub async fn local_authenticate(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some((token, source)) = token_header_first(request.headers()) {
        match tokens.verify(&token) {
            Ok(claims) => {
                let principal = Principal::from_claims(claims);
                debug!(subject_id = principal.subject_id, ?source, "Token verified");
                request.extensions_mut().insert(principal);
            }
            Err(e) => {
                debug!(
                    reason = e.reason(),
                    ?source,
                    path = %request.uri().path(),
                    "Token rejected, continuing unauthenticated"
                );
            }
        }
    }
    next.run(request).await
}

/// Path rules deciding which requests may proceed without a principal.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    public_paths: &'static [&'static str],
    public_prefixes: &'static [&'static str],
}

impl AccessPolicy {
    pub const fn new(
        public_paths: &'static [&'static str],
        public_prefixes: &'static [&'static str],
    ) -> Self {
        Self {
            public_paths,
            public_prefixes,
        }
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        *method == Method::OPTIONS
            || self.public_paths.contains(&path)
            || self.public_prefixes.iter().any(|p| path.starts_with(p))
            || is_static_asset(path)
    }
}

/// Reject unauthenticated requests to protected paths.
pub async fn enforce_access_policy(
    State(policy): State<AccessPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let authenticated = request.extensions().get::<Principal>().is_some();
    if authenticated || policy.is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "Unauthenticated request to protected path"
    );
    AuthError::MissingToken.into_response()
}
