// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth2 authorization code client for the social login providers.
//!
//! ## Flow
//!
//! 1. [`OAuthClient::authorization_url`] stores a random `state` bound to
//!    the provider and returns the provider's consent URL.
//! 2. The provider redirects back with `code` and `state`.
//!    [`OAuthClient::complete`] consumes the state (single use), exchanges
//!    the code for a provider access token and fetches the user info.
//!
//! Provider access tokens are used once and never stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::provider::{ProfileError, ProviderProfile};
use crate::storage::{ExpiringStore, Provider};

/// Lifetime of an issued `state` value.
pub const STATE_TTL: Duration = Duration::from_secs(600);

const STATE_CAPACITY: usize = 10_000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("oww-wallet-server/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("login provider '{0}' is not supported")]
    UnknownProvider(String),

    #[error("login provider {0:?} is not configured")]
    NotConfigured(Provider),

    #[error("authorization state is missing, expired or bound to another provider")]
    InvalidState,

    #[error("code exchange failed: {0}")]
    Exchange(String),

    #[error("user info request failed: {0}")]
    UserInfo(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// Endpoints and scopes of one provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// Fallback endpoint listing the user's addresses when the profile hides
    /// the email (GitHub).
    pub emails_url: Option<String>,
    pub scope: &'static str,
}

impl ProviderEndpoints {
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::Google => Self {
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
                emails_url: None,
                scope: "openid profile email",
            },
            Provider::Github => Self {
                authorize_url: "https://github.com/login/oauth/authorize".to_string(),
                token_url: "https://github.com/login/oauth/access_token".to_string(),
                userinfo_url: "https://api.github.com/user".to_string(),
                emails_url: Some("https://api.github.com/user/emails".to_string()),
                scope: "read:user user:email",
            },
        }
    }
}

/// Client credentials of one provider.
#[derive(Debug, Clone)]
pub struct ProviderRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub endpoints: ProviderEndpoints,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

pub struct OAuthClient {
    http: Client,
    /// Public base URL the provider redirects back to, without the
    /// `/login/oauth2/code/{provider}` suffix.
    redirect_base: String,
    registrations: HashMap<Provider, ProviderRegistration>,
    states: Arc<ExpiringStore<Provider>>,
}

impl OAuthClient {
    pub fn new(
        redirect_base: impl Into<String>,
        registrations: HashMap<Provider, ProviderRegistration>,
    ) -> Result<Self, OAuthError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| OAuthError::Client(e.to_string()))?;
        Ok(Self {
            http,
            redirect_base: redirect_base.into().trim_end_matches('/').to_string(),
            registrations,
            states: Arc::new(ExpiringStore::new(STATE_CAPACITY, STATE_TTL)),
        })
    }

    /// Pending `state` values, for the sweeper.
    pub fn states(&self) -> Arc<ExpiringStore<Provider>> {
        Arc::clone(&self.states)
    }

    pub fn configured_providers(&self) -> Vec<Provider> {
        self.registrations.keys().copied().collect()
    }

    fn registration(&self, provider_key: &str) -> Result<(Provider, &ProviderRegistration), OAuthError> {
        let provider =
            Provider::from_key(provider_key).ok_or_else(|| OAuthError::UnknownProvider(provider_key.to_string()))?;
        let registration = self
            .registrations
            .get(&provider)
            .ok_or(OAuthError::NotConfigured(provider))?;
        Ok((provider, registration))
    }

    fn redirect_uri(&self, provider: Provider) -> String {
        format!("{}/login/oauth2/code/{}", self.redirect_base, provider.key())
    }

    /// Consent URL for `provider_key`, with a fresh single-use state.
    pub fn authorization_url(&self, provider_key: &str) -> Result<String, OAuthError> {
        let (provider, registration) = self.registration(provider_key)?;
        let state = Uuid::new_v4().simple().to_string();
        self.states.insert(state.clone(), provider);

        let redirect_uri = self.redirect_uri(provider);
        let url = Url::parse_with_params(
            &registration.endpoints.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", registration.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", registration.endpoints.scope),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| OAuthError::Exchange(format!("invalid authorize URL: {e}")))?;
        Ok(url.into())
    }

    /// Finish the callback: check the state, exchange the code, load the
    /// user's profile.
    pub async fn complete(&self, provider_key: &str, code: &str, state: &str) -> Result<ProviderProfile, OAuthError> {
        let (provider, registration) = self.registration(provider_key)?;
        match self.states.take(state) {
            Some(bound) if bound == provider => {}
            _ => {
                warn!(provider = provider.key(), "OAuth callback with invalid state");
                return Err(OAuthError::InvalidState);
            }
        }

        let access_token = self.exchange_code(provider, registration, code).await?;
        let mut attributes = self.get_json(&registration.endpoints.userinfo_url, &access_token).await?;

        let has_email = attributes
            .get("email")
            .and_then(Value::as_str)
            .is_some_and(|e| !e.trim().is_empty());
        if !has_email {
            if let Some(emails_url) = &registration.endpoints.emails_url {
                if let Some(email) = self.primary_email(emails_url, &access_token).await? {
                    if let Value::Object(map) = &mut attributes {
                        map.insert("email".to_string(), Value::String(email));
                    }
                }
            }
        }

        debug!(provider = provider.key(), "OAuth user info loaded");
        Ok(ProviderProfile::from_attributes(provider.key(), &attributes)?)
    }

    async fn exchange_code(
        &self,
        provider: Provider,
        registration: &ProviderRegistration,
        code: &str,
    ) -> Result<String, OAuthError> {
        let redirect_uri = self.redirect_uri(provider);
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", registration.client_id.as_str()),
            ("client_secret", registration.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&registration.endpoints.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::Exchange(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(OAuthError::Exchange(format!("token request returned {status}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::Exchange(format!("invalid token response: {e}")))?;

        if token.access_token.trim().is_empty() {
            return Err(OAuthError::Exchange(
                "token response did not include access_token".to_string(),
            ));
        }
        Ok(token.access_token)
    }

    async fn get_json(&self, url: &str, access_token: &str) -> Result<Value, OAuthError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| OAuthError::UserInfo(format!("GET {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(OAuthError::UserInfo(format!("GET {url} returned {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::UserInfo(format!("GET {url} invalid JSON: {e}")))
    }

    async fn primary_email(&self, url: &str, access_token: &str) -> Result<Option<String>, OAuthError> {
        let value = self.get_json(url, access_token).await?;
        let emails: Vec<GithubEmail> =
            serde_json::from_value(value).map_err(|e| OAuthError::UserInfo(format!("invalid email list: {e}")))?;
        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}
