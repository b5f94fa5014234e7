// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::tokens::TokenError;

/// Authentication rejection.
///
/// The variant is only visible in logs. Every variant renders the same
/// 401 body so clients cannot tell an expired token from a forged one.
#[derive(Debug)]
pub enum AuthError {
    /// No token in cookie or header.
    MissingToken,
    /// A token was present but failed verification.
    InvalidToken(TokenError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
    message: &'static str,
}

impl AuthError {
    /// Reason for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken(e) => e.reason(),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        AuthError::InvalidToken(e)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "No authentication token presented"),
            AuthError::InvalidToken(e) => write!(f, "Invalid token: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(AuthErrorBody {
            error: "Unauthorized",
            message: "Authentication required",
        });
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}
