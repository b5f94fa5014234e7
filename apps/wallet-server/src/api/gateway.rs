// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Gateway
//!
//! Reverse proxy in front of the identity and banking services. Every
//! request first passes the [edge authenticator](crate::auth::edge), then
//! is matched against the route table:
//!
//! | Public prefix | Upstream | Forwarded as |
//! |---------------|----------|--------------|
//! | `/api/auth/` | identity | unchanged |
//! | `/api/banking/` | banking | `/api/...` |
//! | `/auth/` | identity | prefix stripped |
//! | `/oauth2/`, `/login/oauth2/` | identity | unchanged |
//!
//! Upstream redirects are passed back to the browser, not followed.

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use reqwest::{redirect::Policy, Client};
use tracing::{debug, warn};

use super::health;
use crate::auth::edge::edge_authenticate;
use crate::error::ApiError;
use crate::state::GatewayState;

const PROXY_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

/// One row of the route table.
#[derive(Debug, Clone)]
pub struct ProxyRoute {
    pub prefix: &'static str,
    /// Replaces `prefix` in the forwarded path.
    pub rewrite_to: &'static str,
    pub upstream: String,
}

impl ProxyRoute {
    fn target(&self, path_and_query: &str) -> Option<String> {
        let rest = path_and_query.strip_prefix(self.prefix)?;
        Some(format!("{}{}{}", self.upstream, self.rewrite_to, rest))
    }
}

pub struct Proxy {
    client: Client,
    routes: Vec<ProxyRoute>,
}

impl Proxy {
    pub fn new(identity_upstream: &str, banking_upstream: &str) -> Result<Self, reqwest::Error> {
        let identity = identity_upstream.trim_end_matches('/').to_string();
        let banking = banking_upstream.trim_end_matches('/').to_string();
        let routes = vec![
            ProxyRoute {
                prefix: "/api/auth/",
                rewrite_to: "/api/auth/",
                upstream: identity.clone(),
            },
            ProxyRoute {
                prefix: "/api/banking/",
                rewrite_to: "/api/",
                upstream: banking,
            },
            ProxyRoute {
                prefix: "/auth/",
                rewrite_to: "/",
                upstream: identity.clone(),
            },
            ProxyRoute {
                prefix: "/oauth2/",
                rewrite_to: "/oauth2/",
                upstream: identity.clone(),
            },
            ProxyRoute {
                prefix: "/login/oauth2/",
                rewrite_to: "/login/oauth2/",
                upstream: identity,
            },
        ];
        Self::with_routes(routes)
    }

    pub fn with_routes(routes: Vec<ProxyRoute>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(PROXY_TIMEOUT)
            .build()?;
        Ok(Self { client, routes })
    }

    /// Upstream URL for a public path, if any route matches.
    pub fn resolve(&self, path_and_query: &str) -> Option<String> {
        self.routes.iter().find_map(|r| r.target(path_and_query))
    }

    pub async fn forward(&self, request: Request) -> Response {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        let Some(target) = self.resolve(&path_and_query) else {
            return ApiError::not_found("No route for path").into_response();
        };

        let (parts, body) = request.into_parts();
        let body = match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => return ApiError::bad_request(format!("Request body rejected: {e}")).into_response(),
        };

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        debug!(method = %parts.method, path = %parts.uri.path(), "Proxying request");
        let upstream = self
            .client
            .request(parts.method, &target)
            .headers(headers)
            .body(body)
            .send()
            .await;

        let upstream = match upstream {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, path = %parts.uri.path(), "Upstream request failed");
                return ApiError::bad_gateway().into_response();
            }
        };

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        response_headers.remove(header::CONTENT_LENGTH);

        match upstream.bytes().await {
            Ok(bytes) => {
                let mut response = Response::new(Body::from(bytes));
                *response.status_mut() = status;
                *response.headers_mut() = response_headers;
                response
            }
            Err(e) => {
                warn!(error = %e, "Upstream body read failed");
                ApiError::bad_gateway().into_response()
            }
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

async fn proxy(State(state): State<GatewayState>, request: Request) -> Response {
    state.proxy.forward(request).await
}

pub fn router(state: GatewayState) -> Router {
    let edge = state.edge.clone();
    Router::new()
        .route("/health", get(health::gateway_health))
        .fallback(proxy)
        .with_state(state)
        .layer(from_fn_with_state(edge, edge_authenticate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::edge::EdgeAuthenticator;
    use crate::auth::{Principal, Role, TokenService};
    use crate::crypto::PseudonymizedId;
    use axum::http::{HeaderValue, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"gateway-proxy-test-secret-0123456789";

    /// Upstream that echoes the path and identity headers it received.
    async fn spawn_echo() -> String {
        async fn echo(request: Request) -> Response {
            let headers = request.headers();
            let value = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-")
                    .to_string()
            };
            let body = format!(
                "{} {} user={} auth={}",
                request.method(),
                request.uri(),
                value("x-user-no"),
                if value("authorization").starts_with("Bearer ") { "bearer" } else { "none" },
            );
            if request.uri().path() == "/redirect" {
                return (StatusCode::FOUND, [(header::LOCATION, "/elsewhere")], body).into_response();
            }
            body.into_response()
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(echo)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn tokens() -> Arc<TokenService> {
        Arc::new(TokenService::new(SECRET, Duration::from_secs(600), Duration::from_secs(6000)))
    }

    fn gateway(tokens: Arc<TokenService>, upstream: &str) -> Router {
        router(GatewayState {
            edge: Arc::new(EdgeAuthenticator::new(tokens, "/auth/oauth2/authorization/google")),
            proxy: Arc::new(Proxy::new(upstream, upstream).unwrap()),
        })
    }

    fn access_token(tokens: &TokenService) -> String {
        tokens
            .issue_access(&Principal {
                subject_id: 42,
                display_name: "Erin".to_string(),
                pseudonymized_id: PseudonymizedId::from_raw("e".repeat(64)),
                role: Role::User,
            })
            .unwrap()
    }

    async fn call(app: Router, req: axum::http::Request<Body>) -> (StatusCode, HeaderMap, String) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn route_table_rewrites_prefixes() {
        let proxy = Proxy::new("http://id:8081/", "http://bank:8082").unwrap();
        assert_eq!(
            proxy.resolve("/api/banking/transfer?x=1").as_deref(),
            Some("http://bank:8082/api/transfer?x=1")
        );
        assert_eq!(
            proxy.resolve("/api/auth/me").as_deref(),
            Some("http://id:8081/api/auth/me")
        );
        assert_eq!(
            proxy.resolve("/auth/oauth2/authorization/google").as_deref(),
            Some("http://id:8081/oauth2/authorization/google")
        );
        assert_eq!(proxy.resolve("/api/other"), None);
    }

    #[tokio::test]
    async fn authenticated_banking_call_is_rewritten_and_carries_identity() {
        let upstream = spawn_echo().await;
        let tokens = tokens();
        let token = access_token(&tokens);
        let req = axum::http::Request::get("/api/banking/account")
            .header(header::COOKIE, format!("jwt-token={token}"))
            .header("x-user-no", "1")
            .body(Body::empty())
            .unwrap();

        let (status, _, body) = call(gateway(tokens, &upstream), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "GET /api/account user=42 auth=bearer");
    }

    #[tokio::test]
    async fn auth_prefix_is_stripped_without_a_token() {
        let upstream = spawn_echo().await;
        let req = axum::http::Request::get("/auth/oauth2/authorization/google")
            .header("x-user-no", "7")
            .body(Body::empty())
            .unwrap();

        let (status, _, body) = call(gateway(tokens(), &upstream), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "GET /oauth2/authorization/google user=- auth=none");
    }

    #[tokio::test]
    async fn upstream_redirects_are_returned_not_followed() {
        let upstream = spawn_echo().await;
        let req = axum::http::Request::get("/auth/redirect").body(Body::empty()).unwrap();

        let (status, headers, _) = call(gateway(tokens(), &upstream), req).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers.get(header::LOCATION), Some(&HeaderValue::from_static("/elsewhere")));
    }

    #[tokio::test]
    async fn unauthenticated_api_call_never_reaches_upstream() {
        let req = axum::http::Request::get("/api/banking/transfer").body(Body::empty()).unwrap();
        // Unroutable upstream: a forwarded request would turn into 502.
        let (status, _, body) = call(gateway(tokens(), "http://127.0.0.1:1"), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Authentication required"));
    }

    #[tokio::test]
    async fn dead_upstream_is_bad_gateway() {
        let tokens = tokens();
        let token = access_token(&tokens);
        let req = axum::http::Request::get("/api/banking/account")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = call(gateway(tokens, "http://127.0.0.1:1"), req).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, r#"{"error":"Upstream service unavailable"}"#);
    }

    #[tokio::test]
    async fn health_is_local() {
        let req = axum::http::Request::get("/health").body(Body::empty()).unwrap();
        let (status, _, body) = call(gateway(tokens(), "http://127.0.0.1:1"), req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Gateway is running"));
    }
}
