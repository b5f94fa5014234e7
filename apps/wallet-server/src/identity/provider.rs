// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User-info extraction per login provider.

use serde_json::Value;

use crate::storage::Provider;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("login provider '{0}' is not supported")]
    UnsupportedProvider(String),

    #[error("provider did not return an email address")]
    MissingEmail,

    #[error("provider did not return a user id")]
    MissingId,
}

/// Fields shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFields {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
}

/// User info as returned by a provider's userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderProfile {
    Google(ProfileFields),
    GitHub(ProfileFields),
}

fn str_attr(attributes: &Value, key: &str) -> Option<String> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ProviderProfile {
    /// Build a profile from raw userinfo attributes, selected by provider key.
    pub fn from_attributes(provider_key: &str, attributes: &Value) -> Result<Self, ProfileError> {
        let provider = Provider::from_key(provider_key)
            .ok_or_else(|| ProfileError::UnsupportedProvider(provider_key.to_string()))?;
        let email = str_attr(attributes, "email").ok_or(ProfileError::MissingEmail)?;

        match provider {
            Provider::Google => {
                let id = str_attr(attributes, "sub").ok_or(ProfileError::MissingId)?;
                let name = str_attr(attributes, "name").unwrap_or_else(|| id.clone());
                Ok(ProviderProfile::Google(ProfileFields {
                    id,
                    name,
                    email,
                    avatar: str_attr(attributes, "picture"),
                }))
            }
            Provider::Github => {
                // GitHub ids are numeric
                let id = match attributes.get("id") {
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::String(s)) if !s.is_empty() => s.clone(),
                    _ => return Err(ProfileError::MissingId),
                };
                let name = str_attr(attributes, "name")
                    .or_else(|| str_attr(attributes, "login"))
                    .unwrap_or_else(|| id.clone());
                Ok(ProviderProfile::GitHub(ProfileFields {
                    id,
                    name,
                    email,
                    avatar: str_attr(attributes, "avatar_url"),
                }))
            }
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ProviderProfile::Google(_) => Provider::Google,
            ProviderProfile::GitHub(_) => Provider::Github,
        }
    }

    pub fn fields(&self) -> &ProfileFields {
        match self {
            ProviderProfile::Google(f) | ProviderProfile::GitHub(f) => f,
        }
    }
}
