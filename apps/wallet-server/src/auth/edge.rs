// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Edge Authenticator
//!
//! Per-request gateway filter. Each request moves through
//!
//! ```text
//! START -> EXTRACT -> BYPASS                 -> next service
//!                  -> VERIFY -> FORWARD      -> next service (trusted headers)
//!                            -> REJECT       -> 401 JSON (/api/..) or 302 login
//! ```
//!
//! - `EXTRACT` reads the `jwt-token` cookie, then `Authorization: Bearer`.
//! - `BYPASS` covers static assets, auth endpoints and health checks.
//! - `FORWARD` writes `x-user-no`, `x-username`, `x-user-role` and
//!   `x-user-email-hash`, and re-attaches the bearer token so the service
//!   can verify it again. The headers are advisory only.
//! - `REJECT` never echoes the token and never produces a 5xx. Anything that
//!   goes wrong while building the forwarded request is a rejection too.
//!
//! Inbound `x-user-*` headers are stripped unconditionally, so a client
//! cannot smuggle identity through a bypassed path either.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, LOCATION},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::cookies::{token_cookie_first, TokenSource};
use super::{Principal, TokenError, TokenService};

pub const HEADER_USER_NO: HeaderName = HeaderName::from_static("x-user-no");
pub const HEADER_USERNAME: HeaderName = HeaderName::from_static("x-username");
pub const HEADER_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");
pub const HEADER_USER_EMAIL_HASH: HeaderName = HeaderName::from_static("x-user-email-hash");

const FORWARDED_IDENTITY_HEADERS: [HeaderName; 4] = [
    HEADER_USER_NO,
    HEADER_USERNAME,
    HEADER_USER_ROLE,
    HEADER_USER_EMAIL_HASH,
];

// =============================================================================
// Path Classification
// =============================================================================

const STATIC_PREFIXES: &[&str] = &["/css/", "/js/", "/img/", "/images/", "/static/", "/webjars/"];

const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".ico", ".svg", ".woff", ".woff2", ".ttf",
    ".eot",
];

const AUTH_PREFIXES: &[&str] = &["/auth/", "/login/", "/oauth2/"];

const PUBLIC_PATHS: &[&str] = &["/", "/health", "/favicon.ico"];

/// Redeemed with the refresh cookie, so it must stay reachable once the
/// access token has expired.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Static assets: well-known asset directories, or file extensions outside
/// `/api/`.
pub fn is_static_asset(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    STATIC_PREFIXES.iter().any(|p| lower.starts_with(p))
        || (!is_api_path(&lower) && STATIC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)))
}

/// Requests that skip verification at the edge.
pub fn is_bypassed(method: &Method, path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
        || (*method == Method::POST && path == REFRESH_PATH)
        || AUTH_PREFIXES.iter().any(|p| path.starts_with(p))
        || is_static_asset(path)
}

/// Requests whose rejection is a JSON 401 rather than a login redirect.
pub fn is_api_path(path: &str) -> bool {
    path.starts_with("/api/")
}

// =============================================================================
// Decision
// =============================================================================

/// Outcome of the edge state machine for one request.
#[derive(Debug)]
pub enum EdgeDecision {
    Bypass,
    Forward { principal: Principal, token: String },
    Reject(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NoToken,
    Invalid(TokenError),
    Internal(&'static str),
}

impl RejectReason {
    fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoToken => "missing_token",
            RejectReason::Invalid(e) => e.reason(),
            RejectReason::Internal(what) => what,
        }
    }
}

#[derive(Serialize)]
struct UnauthorizedBody {
    success: bool,
    error: &'static str,
    message: &'static str,
    timestamp: String,
}

/// Gateway-side authenticator.
pub struct EdgeAuthenticator {
    tokens: Arc<TokenService>,
    login_entry: String,
}

impl EdgeAuthenticator {
    pub fn new(tokens: Arc<TokenService>, login_entry: impl Into<String>) -> Self {
        Self {
            tokens,
            login_entry: login_entry.into(),
        }
    }

    /// EXTRACT, then BYPASS or VERIFY.
    pub fn decide(&self, method: &Method, path: &str, headers: &HeaderMap) -> EdgeDecision {
        if is_bypassed(method, path) {
            return EdgeDecision::Bypass;
        }

        let Some((token, source)) = token_cookie_first(headers) else {
            return EdgeDecision::Reject(RejectReason::NoToken);
        };

        match self.tokens.verify(&token) {
            Ok(claims) => {
                debug!(subject_id = claims.uid, from_cookie = source == TokenSource::Cookie, "Edge token verified");
                EdgeDecision::Forward {
                    principal: Principal::from_claims(claims),
                    token,
                }
            }
            Err(e) => EdgeDecision::Reject(RejectReason::Invalid(e)),
        }
    }

    /// Response for a rejected request.
    pub fn reject(&self, path: &str) -> Response {
        if is_api_path(path) {
            let body = UnauthorizedBody {
                success: false,
                error: "Unauthorized",
                message: "Authentication required",
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            };
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }

        match HeaderValue::from_str(&self.login_entry) {
            Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
            Err(_) => (StatusCode::FOUND, [(LOCATION, HeaderValue::from_static("/"))]).into_response(),
        }
    }
}

/// Remove any client-supplied identity headers.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in FORWARDED_IDENTITY_HEADERS.iter() {
        headers.remove(name);
    }
}

/// Write the trusted identity headers and the bearer token.
///
/// The display name is form-urlencoded so any UTF-8 name survives as a
/// header value.
pub fn attach_identity(
    headers: &mut HeaderMap,
    principal: &Principal,
    token: &str,
) -> Result<(), RejectReason> {
    let internal = |_| RejectReason::Internal("header_encoding");
    let username: String = url::form_urlencoded::byte_serialize(principal.display_name.as_bytes()).collect();

    headers.insert(HEADER_USER_NO, HeaderValue::from(principal.subject_id));
    headers.insert(HEADER_USERNAME, HeaderValue::from_str(&username).map_err(internal)?);
    headers.insert(
        HEADER_USER_ROLE,
        HeaderValue::from_str(&principal.role.authority()).map_err(internal)?,
    );
    headers.insert(
        HEADER_USER_EMAIL_HASH,
        HeaderValue::from_str(principal.pseudonymized_id.as_str()).map_err(internal)?,
    );
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(internal)?,
    );
    Ok(())
}

/// Gateway middleware driving the edge state machine.
pub async fn edge_authenticate(
    State(edge): State<Arc<EdgeAuthenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    strip_identity_headers(request.headers_mut());
    let path = request.uri().path().to_string();

    let reason = match edge.decide(request.method(), &path, request.headers()) {
        EdgeDecision::Bypass => return next.run(request).await,
        EdgeDecision::Forward { principal, token } => {
            match attach_identity(request.headers_mut(), &principal, &token) {
                Ok(()) => return next.run(request).await,
                Err(reason) => reason,
            }
        }
        EdgeDecision::Reject(reason) => reason,
    };

    info!(path = %path, reason = reason.as_str(), "Edge authentication rejected request");
    edge.reject(&path)
}
