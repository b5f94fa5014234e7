// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{http::HeaderName, Router};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub mod banking;
pub mod gateway;
pub mod health;
pub mod identity;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request ids and HTTP spans, applied outermost on every service.
///
/// An incoming `x-request-id` is kept, so the id assigned at the gateway
/// follows the request into the identity and banking services.
pub fn with_request_tracing(router: Router) -> Router {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    router
        .layer(PropagateRequestIdLayer::new(header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(header, MakeRequestUuid))
}
