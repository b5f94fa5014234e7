// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Social login, token refresh and identity lookup.
//!
//! The provider's email is pseudonymized on arrival and then dropped. Only
//! the pseudonymized id is stored or placed in a token; logs carry the
//! masked form.

use std::sync::Arc;

use tracing::{info, warn};

use super::provider::ProviderProfile;
use crate::auth::{IssuedTokens, Principal, TokenError, TokenService};
use crate::crypto::{mask_email, Pseudonymizer};
use crate::storage::{Identity, IdentityDbError, IdentityStore, NewIdentity};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("provider profile carries no usable email")]
    MissingEmail,

    #[error("identity is deactivated")]
    Inactive,

    #[error("identity not found")]
    NotFound,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] IdentityDbError),
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub tokens: IssuedTokens,
    pub created: bool,
}

/// Result of redeeming a refresh token.
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub identity: Identity,
    pub access_token: String,
}

pub fn principal_of(identity: &Identity) -> Principal {
    Principal {
        subject_id: identity.subject_id,
        display_name: identity.display_name.clone(),
        pseudonymized_id: identity.pseudonymized_id.clone(),
        role: identity.role,
    }
}

pub struct IdentityService<S> {
    store: Arc<S>,
    pseudonymizer: Arc<Pseudonymizer>,
    tokens: Arc<TokenService>,
}

impl<S> Clone for IdentityService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pseudonymizer: Arc::clone(&self.pseudonymizer),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<S: IdentityStore> IdentityService<S> {
    pub fn new(store: Arc<S>, pseudonymizer: Arc<Pseudonymizer>, tokens: Arc<TokenService>) -> Self {
        Self {
            store,
            pseudonymizer,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, IdentityError>
    where
        F: FnOnce(&S) -> Result<T, IdentityDbError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| IdentityDbError::Task(e.to_string()))?
            .map_err(IdentityError::from)
    }

    /// Find or create the identity behind a provider profile and issue tokens.
    pub async fn login(&self, profile: &ProviderProfile) -> Result<LoginOutcome, IdentityError> {
        let fields = profile.fields();
        let masked = mask_email(&fields.email);
        let pseudo = self.pseudonymizer.hash(&fields.email).ok_or(IdentityError::MissingEmail)?;

        let new = NewIdentity {
            pseudonymized_id: pseudo,
            display_name: fields.name.clone(),
            provider: profile.provider(),
            provider_id: fields.id.clone(),
            avatar_url: fields.avatar.clone(),
        };
        let (identity, created) = self.blocking(move |store| store.find_or_create(new)).await?;

        if !identity.active {
            warn!(email = %masked, subject_id = identity.subject_id, "Login refused for inactive identity");
            return Err(IdentityError::Inactive);
        }

        let tokens = self.tokens.issue(&principal_of(&identity))?;
        info!(
            email = %masked,
            provider = identity.provider.key(),
            subject_id = identity.subject_id,
            created,
            "Social login succeeded"
        );
        Ok(LoginOutcome {
            identity,
            tokens,
            created,
        })
    }

    /// Exchange a refresh token for a new access token. Pseudonymized id,
    /// role and display name are re-read from the store.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Refreshed, IdentityError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let identity = self.identity(claims.uid).await?;
        if !identity.active {
            return Err(IdentityError::Inactive);
        }
        let access_token = self.tokens.issue_access(&principal_of(&identity))?;
        info!(subject_id = identity.subject_id, "Access token refreshed");
        Ok(Refreshed {
            identity,
            access_token,
        })
    }

    pub async fn identity(&self, subject_id: u64) -> Result<Identity, IdentityError> {
        self.blocking(move |store| store.find_by_subject(subject_id))
            .await?
            .ok_or(IdentityError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::identity::provider::ProfileFields;
    use crate::storage::{IdentityDatabase, Provider};
    use std::time::Duration;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<IdentityDatabase>,
        service: IdentityService<IdentityDatabase>,
        pseudonymizer: Arc<Pseudonymizer>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(IdentityDatabase::open(&dir.path().join("identity.redb")).unwrap());
        let pseudonymizer = Arc::new(Pseudonymizer::new("identity-test-salt"));
        let tokens = Arc::new(TokenService::new(
            b"identity-service-test-secret-0123456789",
            Duration::from_secs(3600),
            Duration::from_secs(7200),
        ));
        let service = IdentityService::new(Arc::clone(&store), Arc::clone(&pseudonymizer), tokens);
        Fixture {
            _dir: dir,
            store,
            service,
            pseudonymizer,
        }
    }

    fn google(name: &str, email: &str) -> ProviderProfile {
        ProviderProfile::Google(ProfileFields {
            id: "g-1".to_string(),
            name: name.to_string(),
            email: email.to_string(),
            avatar: None,
        })
    }

    #[tokio::test]
    async fn first_login_creates_identity_with_pseudonymized_email() {
        let f = fixture();
        let outcome = f.service.login(&google("Kim", "kim@example.com")).await.unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.identity.role, Role::User);
        assert_eq!(outcome.identity.provider, Provider::Google);
        assert_eq!(
            Some(outcome.identity.pseudonymized_id.clone()),
            f.pseudonymizer.hash("kim@example.com")
        );

        let claims = f.service.tokens().verify(&outcome.tokens.access_token).unwrap();
        assert_eq!(claims.uid, outcome.identity.subject_id);
        assert_eq!(claims.pseudo_id, outcome.identity.pseudonymized_id.as_str());
        assert!(!claims.pseudo_id.contains('@'));
    }

    #[tokio::test]
    async fn repeat_login_updates_display_name_and_keeps_subject() {
        let f = fixture();
        let first = f.service.login(&google("Kim", "kim@example.com")).await.unwrap();
        let second = f.service.login(&google("Kim Minsu", " kim@example.com ")).await.unwrap();

        assert!(!second.created);
        assert_eq!(second.identity.subject_id, first.identity.subject_id);
        assert_eq!(second.identity.display_name, "Kim Minsu");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn simultaneous_first_logins_yield_one_identity() {
        let f = fixture();
        let profile = google("Kim", "kim@example.com");
        let (a, b, c) = tokio::join!(
            f.service.login(&profile),
            f.service.login(&profile),
            f.service.login(&profile),
        );
        let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.created).count(), 1);
        assert!(outcomes
            .iter()
            .all(|o| o.identity.subject_id == outcomes[0].identity.subject_id));
    }

    #[tokio::test]
    async fn inactive_identity_cannot_log_in_or_refresh() {
        let f = fixture();
        let outcome = f.service.login(&google("Kim", "kim@example.com")).await.unwrap();

        let mut identity = outcome.identity.clone();
        identity.active = false;
        f.store.update(&identity).unwrap();

        let login = f.service.login(&google("Kim", "kim@example.com")).await;
        assert!(matches!(login, Err(IdentityError::Inactive)));
        let refresh = f.service.refresh(&outcome.tokens.refresh_token).await;
        assert!(matches!(refresh, Err(IdentityError::Inactive)));
    }

    #[tokio::test]
    async fn refresh_rederives_claims_from_store() {
        let f = fixture();
        let outcome = f.service.login(&google("Kim", "kim@example.com")).await.unwrap();

        let refreshed = f.service.refresh(&outcome.tokens.refresh_token).await.unwrap();
        let claims = f.service.tokens().verify(&refreshed.access_token).unwrap();
        assert_eq!(claims.pseudo_id, outcome.identity.pseudonymized_id.as_str());
        assert_eq!(claims.role.as_deref(), Some("USER"));
    }

    #[tokio::test]
    async fn access_token_cannot_be_redeemed_as_refresh() {
        let f = fixture();
        let outcome = f.service.login(&google("Kim", "kim@example.com")).await.unwrap();
        let err = f.service.refresh(&outcome.tokens.access_token).await.unwrap_err();
        assert!(matches!(err, IdentityError::Token(_)));
    }

    #[tokio::test]
    async fn blank_email_is_refused() {
        let f = fixture();
        let err = f.service.login(&google("Kim", "   ")).await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingEmail));
    }
}
