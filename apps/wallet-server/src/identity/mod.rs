// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity service domain: social login and token refresh.

pub mod oauth;
pub mod provider;
pub mod service;

pub use oauth::{OAuthClient, OAuthError, ProviderEndpoints, ProviderRegistration};
pub use provider::{ProfileError, ProfileFields, ProviderProfile};
pub use service::{principal_of, IdentityError, IdentityService, LoginOutcome, Refreshed};
