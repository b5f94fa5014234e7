// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared state of each service's router.

use std::sync::Arc;

use crate::api::gateway::Proxy;
use crate::auth::cookies::CookiePolicy;
use crate::auth::edge::EdgeAuthenticator;
use crate::auth::TokenService;
use crate::banking::{AccountService, SafeboxService, TransferService};
use crate::identity::{IdentityService, OAuthClient};
use crate::storage::{IdentityDatabase, LedgerDatabase};

#[derive(Clone)]
pub struct GatewayState {
    pub edge: Arc<EdgeAuthenticator>,
    pub proxy: Arc<Proxy>,
}

/// Where the identity service sends the browser after the OAuth callback.
#[derive(Debug, Clone)]
pub struct LoginRedirects {
    pub success: String,
    pub failure: String,
}

#[derive(Clone)]
pub struct IdentityState {
    pub identity: IdentityService<IdentityDatabase>,
    pub oauth: Arc<OAuthClient>,
    pub tokens: Arc<TokenService>,
    pub cookies: CookiePolicy,
    pub redirects: Arc<LoginRedirects>,
}

#[derive(Clone)]
pub struct BankingState {
    pub accounts: Arc<AccountService<LedgerDatabase>>,
    pub transfers: Arc<TransferService<LedgerDatabase>>,
    pub safebox: Arc<SafeboxService<LedgerDatabase>>,
    pub tokens: Arc<TokenService>,
}
