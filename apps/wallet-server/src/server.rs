// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service assembly and lifecycle.
//!
//! [`build`] turns settings into a ready router plus the background work
//! the service owns. [`run`] binds the listener and serves until SIGINT or
//! SIGTERM, then cancels background work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api;
use crate::api::gateway::Proxy;
use crate::auth::cookies::CookiePolicy;
use crate::auth::edge::EdgeAuthenticator;
use crate::auth::TokenService;
use crate::banking::{AccountService, Ledger, LogMailer, SafeboxService, TransferService};
use crate::config::{
    BankingSettings, ConfigError, Env, GatewaySettings, IdentitySettings, OAuthCredentials,
    ServerSettings, ServiceKind, TokenSettings,
};
use crate::crypto::{FieldCipher, Pseudonymizer};
use crate::identity::{IdentityService, OAuthClient, OAuthError, ProviderEndpoints, ProviderRegistration};
use crate::state::{BankingState, GatewayState, IdentityState, LoginRedirects};
use crate::storage::{
    run_sweeper, ExpiringStore, IdentityDatabase, IdentityDbError, LedgerDatabase, LedgerError,
    Provider, Sweep,
};

pub const IDENTITY_DB_FILE: &str = "identity.redb";
pub const LEDGER_DB_FILE: &str = "ledger.redb";

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const VERIFICATION_CODE_CAPACITY: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to prepare data directory: {0}")]
    DataDir(std::io::Error),

    #[error("failed to open identity store: {0}")]
    IdentityStore(#[from] IdentityDbError),

    #[error("failed to open ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("failed to build proxy client: {0}")]
    Proxy(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

fn token_service(env: &impl Env) -> Result<Arc<TokenService>, StartupError> {
    let settings = TokenSettings::load(env)?;
    Ok(Arc::new(TokenService::new(
        &settings.secret,
        settings.access_ttl,
        settings.refresh_ttl,
    )))
}

fn spawn_sweeper(stores: Vec<Arc<dyn Sweep>>, shutdown: &CancellationToken) {
    tokio::spawn(run_sweeper(stores, SWEEP_INTERVAL, shutdown.clone()));
}

pub fn build_gateway(env: &impl Env) -> Result<Router, StartupError> {
    let settings = GatewaySettings::load(env)?;
    let tokens = token_service(env)?;
    let proxy = Proxy::new(&settings.identity_upstream, &settings.banking_upstream)?;
    info!(
        identity = %settings.identity_upstream,
        banking = %settings.banking_upstream,
        "Gateway upstreams configured"
    );
    Ok(api::gateway::router(GatewayState {
        edge: Arc::new(EdgeAuthenticator::new(tokens, settings.login_entry_path)),
        proxy: Arc::new(proxy),
    }))
}

fn registration(provider: Provider, credentials: OAuthCredentials) -> (Provider, ProviderRegistration) {
    (
        provider,
        ProviderRegistration {
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            endpoints: ProviderEndpoints::for_provider(provider),
        },
    )
}

pub fn build_identity(env: &impl Env, shutdown: &CancellationToken) -> Result<Router, StartupError> {
    let settings = IdentitySettings::load(env)?;
    let tokens = token_service(env)?;

    std::fs::create_dir_all(&settings.data_dir).map_err(StartupError::DataDir)?;
    let store = Arc::new(IdentityDatabase::open(&settings.data_dir.join(IDENTITY_DB_FILE))?);

    let registrations: HashMap<Provider, ProviderRegistration> = [
        settings.google.map(|c| registration(Provider::Google, c)),
        settings.github.map(|c| registration(Provider::Github, c)),
    ]
    .into_iter()
    .flatten()
    .collect();
    let oauth = Arc::new(OAuthClient::new(settings.redirect_base, registrations)?);
    info!(providers = ?oauth.configured_providers(), "Social login providers configured");

    let states: Arc<dyn Sweep> = oauth.states();
    spawn_sweeper(vec![states], shutdown);

    let state = IdentityState {
        identity: IdentityService::new(
            store,
            Arc::new(Pseudonymizer::new(&settings.pseudonym_salt)),
            tokens.clone(),
        ),
        oauth,
        tokens,
        cookies: CookiePolicy {
            secure: settings.cookie_secure,
        },
        redirects: Arc::new(LoginRedirects {
            success: settings.login_success_url,
            failure: settings.login_failure_url,
        }),
    };
    Ok(api::identity::router(state))
}

pub fn build_banking(env: &impl Env, shutdown: &CancellationToken) -> Result<Router, StartupError> {
    let settings = BankingSettings::load(env)?;
    let tokens = token_service(env)?;

    std::fs::create_dir_all(&settings.data_dir).map_err(StartupError::DataDir)?;
    let db = Arc::new(LedgerDatabase::open(&settings.data_dir.join(LEDGER_DB_FILE))?);
    let ledger = Ledger::new(db, settings.ledger_timeout);
    let cipher = Arc::new(FieldCipher::new(&settings.field_cipher_key));

    let codes = Arc::new(ExpiringStore::new(
        VERIFICATION_CODE_CAPACITY,
        settings.verification_code_ttl,
    ));
    let sweep: Arc<dyn Sweep> = codes.clone();
    spawn_sweeper(vec![sweep], shutdown);

    let state = BankingState {
        accounts: Arc::new(AccountService::new(
            ledger.clone(),
            cipher.clone(),
            codes,
            Arc::new(LogMailer),
            settings.account_number_prefix,
        )),
        transfers: Arc::new(TransferService::new(ledger.clone(), cipher)),
        safebox: Arc::new(SafeboxService::new(ledger)),
        tokens,
    };
    Ok(api::banking::router(state))
}

/// Router for the configured service, wrapped with request tracing.
pub fn build(service: ServiceKind, env: &impl Env, shutdown: &CancellationToken) -> Result<Router, StartupError> {
    let router = match service {
        ServiceKind::Gateway => build_gateway(env)?,
        ServiceKind::Identity => build_identity(env, shutdown)?,
        ServiceKind::Banking => build_banking(env, shutdown)?,
    };
    Ok(api::with_request_tracing(router))
}

pub async fn run(settings: ServerSettings, env: &impl Env) -> Result<(), StartupError> {
    let shutdown = CancellationToken::new();
    let app = build(settings.service, env, &shutdown)?;

    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr).await.map_err(|source| StartupError::Bind {
        addr: addr.clone(),
        source,
    })?;
    info!(service = settings.service.as_str(), %addr, "Listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    shutdown.cancel();
    info!(service = settings.service.as_str(), "Server stopped");
    result.map_err(StartupError::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FIELD_CIPHER_KEY_ENV, DATA_DIR_ENV, JWT_SECRET_ENV, OAUTH_GOOGLE_CLIENT_ID_ENV,
        OAUTH_GOOGLE_CLIENT_SECRET_ENV, PSEUDONYM_SALT_ENV,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const SECRET: &str = "server-assembly-test-secret-0123456789";

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn banking_builds_and_creates_its_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("nested");
        let env = env(&[
            (JWT_SECRET_ENV, SECRET),
            (FIELD_CIPHER_KEY_ENV, "cipher"),
            (DATA_DIR_ENV, data.to_str().unwrap()),
        ]);
        let shutdown = CancellationToken::new();
        let app = build(ServiceKind::Banking, &env, &shutdown).unwrap();
        assert!(data.join(LEDGER_DB_FILE).exists());

        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(api::REQUEST_ID_HEADER));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn identity_requires_a_salt() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&[
            (JWT_SECRET_ENV, SECRET),
            (DATA_DIR_ENV, dir.path().to_str().unwrap()),
        ]);
        let err = build(ServiceKind::Identity, &env, &CancellationToken::new()).unwrap_err();
        assert!(matches!(
            err,
            StartupError::Config(ConfigError::Missing(PSEUDONYM_SALT_ENV))
        ));
    }

    #[tokio::test]
    async fn identity_builds_with_one_provider() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&[
            (JWT_SECRET_ENV, SECRET),
            (PSEUDONYM_SALT_ENV, "salt"),
            (OAUTH_GOOGLE_CLIENT_ID_ENV, "id"),
            (OAUTH_GOOGLE_CLIENT_SECRET_ENV, "secret"),
            (DATA_DIR_ENV, dir.path().to_str().unwrap()),
        ]);
        let app = build(ServiceKind::Identity, &env, &CancellationToken::new()).unwrap();
        let resp = app
            .oneshot(
                Request::get("/oauth2/authorization/github")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // GitHub is not configured
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()["location"], "/login?error=true");
    }

    #[tokio::test]
    async fn short_jwt_secret_is_rejected() {
        let err = build_gateway(&env(&[(JWT_SECRET_ENV, "short")])).unwrap_err();
        assert!(matches!(err, StartupError::Config(ConfigError::Invalid { .. })));
    }
}
