// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Liveness endpoints. Unauthenticated on every service.

use axum::Json;

use crate::models::HealthResponse;

pub const GATEWAY_RUNNING: &str = "Gateway is running";
pub const IDENTITY_RUNNING: &str = "Login Service is running";
pub const BANKING_RUNNING: &str = "Banking Service is running";

fn running(message: &str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP".to_string(),
        message: message.to_string(),
    })
}

pub async fn gateway_health() -> Json<HealthResponse> {
    running(GATEWAY_RUNNING)
}

pub async fn identity_health() -> Json<HealthResponse> {
    running(IDENTITY_RUNNING)
}

/// Liveness check handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn banking_health() -> Json<HealthResponse> {
    running(BANKING_RUNNING)
}
