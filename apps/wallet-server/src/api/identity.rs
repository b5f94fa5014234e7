// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity service endpoints: social login, logout, refresh and the
//! current user.

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::health;
use crate::auth::cookies::{cookie_value, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::auth::{enforce_access_policy, local_authenticate, AccessPolicy, Auth, AuthError};
use crate::error::ApiError;
use crate::identity::IdentityError;
use crate::models::{MeResponse, OperationResult};
use crate::state::IdentityState;

const PUBLIC_PATHS: &[&str] = &["/", "/health", "/api/auth/health", "/api/auth/refresh", "/oauth2/logout"];
const PUBLIC_PREFIXES: &[&str] = &["/oauth2/authorization/", "/login/oauth2/code/"];

pub const IDENTITY_POLICY: AccessPolicy = AccessPolicy::new(PUBLIC_PATHS, PUBLIC_PREFIXES);

/// 302 with optional cookies.
fn found(location: &str, cookies: impl IntoIterator<Item = Option<HeaderValue>>) -> Response {
    let location = HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("/"));
    let mut response = (StatusCode::FOUND, [(LOCATION, location)]).into_response();
    for cookie in cookies.into_iter().flatten() {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// Start the authorization code flow.
pub async fn authorize(State(state): State<IdentityState>, Path(provider): Path<String>) -> Response {
    match state.oauth.authorization_url(&provider) {
        Ok(url) => found(&url, []),
        Err(e) => {
            warn!(provider = %provider, error = %e, "Cannot start social login");
            found(&state.redirects.failure, [])
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Provider callback: finish the flow, log in and set both token cookies.
pub async fn callback(
    State(state): State<IdentityState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        warn!(provider = %provider, error = ?params.error, "Social login callback without code");
        return found(&state.redirects.failure, []);
    };

    let profile = match state.oauth.complete(&provider, &code, &oauth_state).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Social login failed");
            return found(&state.redirects.failure, []);
        }
    };

    match state.identity.login(&profile).await {
        Ok(outcome) => {
            let tokens = outcome.tokens;
            found(
                &state.redirects.success,
                [
                    state.cookies.set(ACCESS_COOKIE, &tokens.access_token, tokens.access_ttl),
                    state.cookies.set(REFRESH_COOKIE, &tokens.refresh_token, tokens.refresh_ttl),
                ],
            )
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "Login refused");
            found(&state.redirects.failure, [])
        }
    }
}

/// Clear both token cookies. Tokens already issued stay valid until expiry.
pub async fn logout(State(state): State<IdentityState>) -> Response {
    info!("Logout");
    found(
        "/",
        [
            state.cookies.clear(ACCESS_COOKIE),
            state.cookies.clear(REFRESH_COOKIE),
        ],
    )
}

/// Current user, re-read from the identity store.
pub async fn me(State(state): State<IdentityState>, Auth(principal): Auth) -> Result<Json<MeResponse>, ApiError> {
    let identity = match state.identity.identity(principal.subject_id).await {
        Ok(identity) => identity,
        Err(IdentityError::NotFound) => return Err(ApiError::not_found("User not found")),
        Err(e) => return Err(ApiError::internal(&e)),
    };
    Ok(Json(MeResponse {
        user_no: identity.subject_id,
        username: identity.display_name,
        role: identity.role,
        provider: identity.provider,
    }))
}

/// Redeem the refresh cookie for a new access cookie.
pub async fn refresh(State(state): State<IdentityState>, headers: HeaderMap) -> Response {
    let Some(token) = cookie_value(&headers, REFRESH_COOKIE) else {
        return AuthError::MissingToken.into_response();
    };

    match state.identity.refresh(&token).await {
        Ok(refreshed) => {
            let mut response = Json(OperationResult::ok("Token refreshed")).into_response();
            if let Some(cookie) = state
                .cookies
                .set(ACCESS_COOKIE, &refreshed.access_token, state.tokens.access_ttl())
            {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            response
        }
        Err(IdentityError::Token(e)) => {
            info!(reason = e.reason(), "Refresh token rejected");
            AuthError::InvalidToken(e).into_response()
        }
        Err(IdentityError::Inactive) | Err(IdentityError::NotFound) => {
            info!("Refresh refused for unknown or inactive identity");
            AuthError::MissingToken.into_response()
        }
        Err(e) => ApiError::internal(&e).into_response(),
    }
}

pub fn router(state: IdentityState) -> Router {
    let tokens = state.tokens.clone();
    Router::new()
        .route("/health", get(health::identity_health))
        .route("/api/auth/health", get(health::identity_health))
        .route("/oauth2/authorization/{provider}", get(authorize))
        .route("/login/oauth2/code/{provider}", get(callback))
        .route("/oauth2/logout", get(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/refresh", post(refresh))
        .with_state(state)
        .layer(from_fn_with_state(IDENTITY_POLICY, enforce_access_policy))
        .layer(from_fn_with_state(tokens, local_authenticate))
}
