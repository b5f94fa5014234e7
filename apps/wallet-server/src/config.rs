// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults and the typed settings each service
//! loads at startup. Missing required secrets fail startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SERVICE` | Which service to run (`gateway`, `identity`, `banking`) | Required |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` / `8081` / `8082` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `JWT_SECRET` | HS256 signing secret shared by all services (≥ 32 bytes) | Required |
//! | `JWT_ACCESS_TTL_SECS` | Access token lifetime | `86400` |
//! | `JWT_REFRESH_TTL_SECS` | Refresh token lifetime | `604800` |
//! | `DATA_DIR` | Directory holding the redb files | `./data` |
//! | `PSEUDONYM_SALT` | Salt of the email pseudonymizer (identity) | Required |
//! | `OAUTH_GOOGLE_CLIENT_ID` / `OAUTH_GOOGLE_CLIENT_SECRET` | Google login client | Optional |
//! | `OAUTH_GITHUB_CLIENT_ID` / `OAUTH_GITHUB_CLIENT_SECRET` | GitHub login client | Optional |
//! | `OAUTH_REDIRECT_BASE` | Public base URL of the identity service callbacks | `http://localhost:8080/auth` |
//! | `LOGIN_SUCCESS_URL` | Redirect after a successful login | `/` |
//! | `LOGIN_FAILURE_URL` | Redirect after a failed login | `/login?error=true` |
//! | `COOKIE_SECURE` | Add `Secure` to token cookies | `false` |
//! | `FIELD_CIPHER_KEY` | Account number encryption secret (banking) | Required |
//! | `LEDGER_TIMEOUT_MS` | Bound on waiting for the ledger | `5000` |
//! | `VERIFICATION_CODE_TTL_SECS` | Email verification code lifetime | `300` |
//! | `ACCOUNT_NUMBER_PREFIX` | Prefix of issued account numbers | `1001-2025` |
//! | `IDENTITY_UPSTREAM` | Identity service base URL (gateway) | `http://127.0.0.1:8081` |
//! | `BANKING_UPSTREAM` | Banking service base URL (gateway) | `http://127.0.0.1:8082` |
//! | `LOGIN_ENTRY_PATH` | Where the gateway sends unauthenticated pages | `/auth/oauth2/authorization/google` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const SERVICE_ENV: &str = "SERVICE";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const JWT_ACCESS_TTL_ENV: &str = "JWT_ACCESS_TTL_SECS";
pub const JWT_REFRESH_TTL_ENV: &str = "JWT_REFRESH_TTL_SECS";

/// Environment variable name for the redb data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const PSEUDONYM_SALT_ENV: &str = "PSEUDONYM_SALT";
pub const OAUTH_GOOGLE_CLIENT_ID_ENV: &str = "OAUTH_GOOGLE_CLIENT_ID";
pub const OAUTH_GOOGLE_CLIENT_SECRET_ENV: &str = "OAUTH_GOOGLE_CLIENT_SECRET";
pub const OAUTH_GITHUB_CLIENT_ID_ENV: &str = "OAUTH_GITHUB_CLIENT_ID";
pub const OAUTH_GITHUB_CLIENT_SECRET_ENV: &str = "OAUTH_GITHUB_CLIENT_SECRET";
pub const OAUTH_REDIRECT_BASE_ENV: &str = "OAUTH_REDIRECT_BASE";
pub const LOGIN_SUCCESS_URL_ENV: &str = "LOGIN_SUCCESS_URL";
pub const LOGIN_FAILURE_URL_ENV: &str = "LOGIN_FAILURE_URL";
pub const COOKIE_SECURE_ENV: &str = "COOKIE_SECURE";

pub const FIELD_CIPHER_KEY_ENV: &str = "FIELD_CIPHER_KEY";
pub const LEDGER_TIMEOUT_MS_ENV: &str = "LEDGER_TIMEOUT_MS";
pub const VERIFICATION_CODE_TTL_ENV: &str = "VERIFICATION_CODE_TTL_SECS";
pub const ACCOUNT_NUMBER_PREFIX_ENV: &str = "ACCOUNT_NUMBER_PREFIX";

pub const IDENTITY_UPSTREAM_ENV: &str = "IDENTITY_UPSTREAM";
pub const BANKING_UPSTREAM_ENV: &str = "BANKING_UPSTREAM";
pub const LOGIN_ENTRY_PATH_ENV: &str = "LOGIN_ENTRY_PATH";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_ACCESS_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_REDIRECT_BASE: &str = "http://localhost:8080/auth";
const DEFAULT_LOGIN_SUCCESS_URL: &str = "/";
const DEFAULT_LOGIN_FAILURE_URL: &str = "/login?error=true";
const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CODE_TTL_SECS: u64 = 300;
const DEFAULT_ACCOUNT_PREFIX: &str = "1001-2025";
const DEFAULT_IDENTITY_UPSTREAM: &str = "http://127.0.0.1:8081";
const DEFAULT_BANKING_UPSTREAM: &str = "http://127.0.0.1:8082";
const DEFAULT_LOGIN_ENTRY_PATH: &str = "/auth/oauth2/authorization/google";

/// Shortest accepted HS256 secret.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Which service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Gateway,
    Identity,
    Banking,
}

impl ServiceKind {
    pub fn default_port(&self) -> u16 {
        match self {
            ServiceKind::Gateway => 8080,
            ServiceKind::Identity => 8081,
            ServiceKind::Banking => 8082,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Gateway => "gateway",
            ServiceKind::Identity => "identity",
            ServiceKind::Banking => "banking",
        }
    }
}

impl FromStr for ServiceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gateway" => Ok(ServiceKind::Gateway),
            "identity" | "login" => Ok(ServiceKind::Identity),
            "banking" => Ok(ServiceKind::Banking),
            other => Err(ConfigError::Invalid {
                name: SERVICE_ENV,
                reason: format!("unknown service '{other}'"),
            }),
        }
    }
}

// =============================================================================
// Environment Access
// =============================================================================

/// Source of configuration values. The process environment in production,
/// a map in tests.
pub trait Env {
    fn get(&self, name: &str) -> Option<String>;

    /// Trimmed, non-empty value.
    fn optional(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}

/// The process environment.
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl<S: std::hash::BuildHasher> Env for std::collections::HashMap<String, String, S> {
    fn get(&self, name: &str) -> Option<String> {
        std::collections::HashMap::get(self, name).cloned()
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub service: ServiceKind,
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn load(env: &impl Env) -> Result<Self, ConfigError> {
        let service: ServiceKind = env.required(SERVICE_ENV)?.parse()?;
        Ok(Self {
            service,
            host: env.or_default(HOST_ENV, DEFAULT_HOST),
            port: env.parsed(PORT_ENV, service.default_port())?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct TokenSettings {
    pub secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenSettings {
    pub fn load(env: &impl Env) -> Result<Self, ConfigError> {
        let secret = env.required(JWT_SECRET_ENV)?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: JWT_SECRET_ENV,
                reason: format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
            });
        }
        Ok(Self {
            secret: secret.into_bytes(),
            access_ttl: Duration::from_secs(env.parsed(JWT_ACCESS_TTL_ENV, DEFAULT_ACCESS_TTL_SECS)?),
            refresh_ttl: Duration::from_secs(env.parsed(JWT_REFRESH_TTL_ENV, DEFAULT_REFRESH_TTL_SECS)?),
        })
    }
}

/// Client id and secret of one login provider.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

fn oauth_credentials(
    env: &impl Env,
    id_name: &'static str,
    secret_name: &'static str,
) -> Result<Option<OAuthCredentials>, ConfigError> {
    match (env.optional(id_name), env.optional(secret_name)) {
        (Some(client_id), Some(client_secret)) => Ok(Some(OAuthCredentials {
            client_id,
            client_secret,
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Missing(secret_name)),
        (None, Some(_)) => Err(ConfigError::Missing(id_name)),
    }
}

#[derive(Clone)]
pub struct IdentitySettings {
    pub data_dir: PathBuf,
    pub pseudonym_salt: String,
    pub google: Option<OAuthCredentials>,
    pub github: Option<OAuthCredentials>,
    pub redirect_base: String,
    pub login_success_url: String,
    pub login_failure_url: String,
    pub cookie_secure: bool,
}

impl IdentitySettings {
    pub fn load(env: &impl Env) -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: PathBuf::from(env.or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            pseudonym_salt: env.required(PSEUDONYM_SALT_ENV)?,
            google: oauth_credentials(env, OAUTH_GOOGLE_CLIENT_ID_ENV, OAUTH_GOOGLE_CLIENT_SECRET_ENV)?,
            github: oauth_credentials(env, OAUTH_GITHUB_CLIENT_ID_ENV, OAUTH_GITHUB_CLIENT_SECRET_ENV)?,
            redirect_base: env.or_default(OAUTH_REDIRECT_BASE_ENV, DEFAULT_REDIRECT_BASE),
            login_success_url: env.or_default(LOGIN_SUCCESS_URL_ENV, DEFAULT_LOGIN_SUCCESS_URL),
            login_failure_url: env.or_default(LOGIN_FAILURE_URL_ENV, DEFAULT_LOGIN_FAILURE_URL),
            cookie_secure: env.parsed(COOKIE_SECURE_ENV, false)?,
        })
    }
}

#[derive(Clone)]
pub struct BankingSettings {
    pub data_dir: PathBuf,
    pub field_cipher_key: String,
    pub ledger_timeout: Duration,
    pub verification_code_ttl: Duration,
    pub account_number_prefix: String,
}

impl BankingSettings {
    pub fn load(env: &impl Env) -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: PathBuf::from(env.or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            field_cipher_key: env.required(FIELD_CIPHER_KEY_ENV)?,
            ledger_timeout: Duration::from_millis(env.parsed(LEDGER_TIMEOUT_MS_ENV, DEFAULT_LEDGER_TIMEOUT_MS)?),
            verification_code_ttl: Duration::from_secs(env.parsed(VERIFICATION_CODE_TTL_ENV, DEFAULT_CODE_TTL_SECS)?),
            account_number_prefix: env.or_default(ACCOUNT_NUMBER_PREFIX_ENV, DEFAULT_ACCOUNT_PREFIX),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub identity_upstream: String,
    pub banking_upstream: String,
    pub login_entry_path: String,
}

impl GatewaySettings {
    pub fn load(env: &impl Env) -> Result<Self, ConfigError> {
        Ok(Self {
            identity_upstream: env.or_default(IDENTITY_UPSTREAM_ENV, DEFAULT_IDENTITY_UPSTREAM),
            banking_upstream: env.or_default(BANKING_UPSTREAM_ENV, DEFAULT_BANKING_UPSTREAM),
            login_entry_path: env.or_default(LOGIN_ENTRY_PATH_ENV, DEFAULT_LOGIN_ENTRY_PATH),
        })
    }
}
