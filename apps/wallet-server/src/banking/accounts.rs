// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account opening, email verification and read-side account queries.
//!
//! ## Opening an Account
//!
//! 1. `send_verification` stores a 6-digit code for the email (TTL store)
//!    and hands it to the [`MailSender`].
//! 2. `open_account` checks the code, hashes the transfer password,
//!    allocates the next account number, encrypts it and inserts the
//!    account in one ledger unit. The code is consumed on success.
//!
//! The account owner is the caller's pseudonymized id from the verified
//! token. The email only proves the caller can receive mail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{info, warn};

use super::ledger::Ledger;
use super::mail::{MailError, MailSender};
use crate::auth::Principal;
use crate::crypto::{mask_email, CipherError, FieldCipher, PasswordError, PasswordVerifier, PseudonymizedId};
use crate::storage::ledger_db::SEQ_ACCOUNT_NUMBER;
use crate::storage::{Account, Direction, ExpiringStore, LedgerError, LedgerStore, NewAccount};

/// Default history page size.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("email address is invalid")]
    InvalidEmail,

    #[error("verification code is missing, expired or wrong")]
    CodeMismatch,

    #[error("transfer password must not be empty")]
    InvalidPassword,

    #[error("an account already exists for this user")]
    AccountAlreadyExists,

    #[error("no account exists for this user")]
    NoSuchAccount,

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for AccountError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AccountAlreadyExists => AccountError::AccountAlreadyExists,
            other => AccountError::Ledger(other),
        }
    }
}

// =============================================================================
// Account Numbers
// =============================================================================

/// Render an account number from the bank prefix and a sequence value.
pub fn format_account_number(prefix: &str, sequence: u64) -> String {
    format!("{prefix}-{sequence:03}")
}

/// Canonicalize user input: hyphens and whitespace are ignored and 11
/// digits are regrouped as `4-4-3`. Anything else is returned trimmed.
pub fn normalize_account_number(input: &str) -> String {
    let digits: String = input
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();
    if digits.len() == 11 && digits.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &digits[..4], &digits[4..8], &digits[8..])
    } else {
        input.trim().to_string()
    }
}

fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

// =============================================================================
// Views
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    /// Plaintext number, or `unavailable` when decryption failed.
    pub account_number: String,
    pub balance: i64,
    pub owner_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientInfo {
    pub owner_name: String,
    pub account_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub direction: Direction,
    pub amount: i64,
    pub memo: String,
    pub timestamp: DateTime<Utc>,
    pub counterparty_name: Option<String>,
    pub counterparty_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenedAccount {
    pub account: Account,
    pub account_number: String,
}

// =============================================================================
// Service
// =============================================================================

pub struct AccountService<S> {
    ledger: Ledger<S>,
    cipher: Arc<FieldCipher>,
    passwords: PasswordVerifier,
    codes: Arc<ExpiringStore<String>>,
    mailer: Arc<dyn MailSender>,
    number_prefix: String,
}

impl<S: LedgerStore> AccountService<S> {
    pub fn new(
        ledger: Ledger<S>,
        cipher: Arc<FieldCipher>,
        codes: Arc<ExpiringStore<String>>,
        mailer: Arc<dyn MailSender>,
        number_prefix: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            cipher,
            passwords: PasswordVerifier::new(),
            codes,
            mailer,
            number_prefix: number_prefix.into(),
        }
    }

    /// Issue a fresh verification code for `email`, replacing any earlier one.
    pub fn send_verification(&self, email: &str) -> Result<(), AccountError> {
        let email = email.trim();
        if !valid_email(email) {
            return Err(AccountError::InvalidEmail);
        }
        let code = generate_code();
        self.codes.insert(email, code.clone());
        self.mailer.send_verification_code(email, &code)?;
        info!(email = %mask_email(email), "Verification code sent");
        Ok(())
    }

    /// Check a code without consuming it.
    pub fn verify_email(&self, email: &str, code: &str) -> bool {
        self.codes
            .get(email.trim())
            .is_some_and(|stored| stored == code.trim())
    }

    pub async fn open_account(
        &self,
        principal: &Principal,
        email: &str,
        code: &str,
        password: &str,
    ) -> Result<OpenedAccount, AccountError> {
        if !self.verify_email(email, code) {
            warn!(email = %mask_email(email.trim()), "Account opening with invalid verification code");
            return Err(AccountError::CodeMismatch);
        }
        if password.is_empty() {
            return Err(AccountError::InvalidPassword);
        }
        let password_hash = self.passwords.hash_blocking(password.to_string()).await?;

        let owner = principal.pseudonymized_id.clone();
        let owner_name = principal.display_name.clone();
        let cipher = Arc::clone(&self.cipher);
        let prefix = self.number_prefix.clone();

        let opened = self
            .ledger
            .write(move |txn| {
                if txn.account_by_owner(&owner)?.is_some() {
                    return Err(AccountError::AccountAlreadyExists);
                }
                let sequence = txn.next_sequence(SEQ_ACCOUNT_NUMBER)?;
                let account_number = format_account_number(&prefix, sequence);
                let account = txn.insert_account(NewAccount {
                    owner,
                    owner_name,
                    encrypted_number: cipher.encrypt(&account_number)?,
                    password_hash: Some(password_hash),
                })?;
                Ok(OpenedAccount {
                    account,
                    account_number,
                })
            })
            .await?;

        self.codes.remove(email.trim());
        info!(
            account_id = opened.account.account_id,
            subject_id = principal.subject_id,
            "Account opened"
        );
        Ok(opened)
    }

    pub async fn summary(&self, owner: &PseudonymizedId) -> Result<Option<AccountSummary>, AccountError> {
        let owner = owner.clone();
        let account = self
            .ledger
            .read(move |v| v.account_by_owner(&owner))
            .await
            .map_err(AccountError::from)?;

        Ok(account.map(|a| AccountSummary {
            account_number: self.cipher.decrypt_or_unavailable(&a.encrypted_number, "account_number"),
            balance: a.balance,
            owner_name: a.owner_name,
            created_at: a.created_at,
        }))
    }

    /// Resolve a typed account number to its holder.
    pub async fn lookup_recipient(&self, account_number: &str) -> Result<Option<RecipientInfo>, AccountError> {
        let normalized = normalize_account_number(account_number);
        let encrypted = self.cipher.encrypt(&normalized)?;
        let account = self
            .ledger
            .read(move |v| v.account_by_number(&encrypted))
            .await
            .map_err(AccountError::from)?;

        Ok(account.map(|a| RecipientInfo {
            owner_name: a.owner_name,
            account_number: normalized,
        }))
    }

    /// Movement history of the owner's account, newest first.
    pub async fn history(&self, owner: &PseudonymizedId, limit: usize) -> Result<Vec<HistoryItem>, AccountError> {
        let owner = owner.clone();
        let rows = self
            .ledger
            .read(move |v| {
                let Some(account) = v.account_by_owner(&owner)? else {
                    return Err(AccountError::NoSuchAccount);
                };
                let mut rows = Vec::new();
                for entry in v.history(account.account_id, limit)? {
                    let counterparty = match entry.counterparty_account_id {
                        Some(id) => v.account(id)?,
                        None => None,
                    };
                    rows.push((entry, counterparty));
                }
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(entry, counterparty)| HistoryItem {
                direction: entry.direction,
                amount: entry.amount,
                memo: entry.memo,
                timestamp: entry.timestamp,
                counterparty_name: counterparty.as_ref().map(|c| c.owner_name.clone()),
                counterparty_number: counterparty
                    .as_ref()
                    .map(|c| self.cipher.decrypt_or_unavailable(&c.encrypted_number, "account_number")),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::banking::ledger::DEFAULT_LEDGER_TIMEOUT;
    use crate::banking::mail::testing::RecordingMailer;
    use crate::storage::LedgerDatabase;
    use std::time::Duration;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        service: AccountService<LedgerDatabase>,
        mailer: Arc<RecordingMailer>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let db = LedgerDatabase::open(&dir.path().join("ledger.redb")).unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let service = AccountService::new(
            Ledger::new(Arc::new(db), DEFAULT_LEDGER_TIMEOUT),
            Arc::new(FieldCipher::new("account-test-cipher-key")),
            Arc::new(ExpiringStore::new(16, Duration::from_secs(300))),
            mailer.clone(),
            "1001-2025",
        );
        Fixture {
            _dir: dir,
            service,
            mailer,
        }
    }

    fn principal(tag: &str) -> Principal {
        Principal {
            subject_id: 1,
            display_name: format!("name-{tag}"),
            pseudonymized_id: PseudonymizedId::from_raw(tag.repeat(64)),
            role: Role::User,
        }
    }

    async fn open(f: &Fixture, tag: &str, email: &str) -> OpenedAccount {
        f.service.send_verification(email).unwrap();
        let code = f.mailer.last_code_for(email).unwrap();
        f.service
            .open_account(&principal(tag), email, &code, "4321")
            .await
            .unwrap()
    }

    #[test]
    fn normalizes_account_numbers() {
        assert_eq!(normalize_account_number("10012025001"), "1001-2025-001");
        assert_eq!(normalize_account_number(" 1001-2025-001 "), "1001-2025-001");
        assert_eq!(normalize_account_number("1001 2025 001"), "1001-2025-001");
        assert_eq!(normalize_account_number("1001-2025-1000"), "1001-2025-1000");
        assert_eq!(normalize_account_number("abc"), "abc");
        assert_eq!(format_account_number("1001-2025", 7), "1001-2025-007");
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn rejects_invalid_email() {
        let f = fixture();
        assert!(matches!(f.service.send_verification("nope"), Err(AccountError::InvalidEmail)));
        assert!(matches!(f.service.send_verification("@x.io"), Err(AccountError::InvalidEmail)));
    }

    #[test]
    fn verify_email_checks_without_consuming() {
        let f = fixture();
        f.service.send_verification("a@x.io").unwrap();
        let code = f.mailer.last_code_for("a@x.io").unwrap();
        assert!(f.service.verify_email("a@x.io", &code));
        assert!(f.service.verify_email("a@x.io", &code));
        assert!(!f.service.verify_email("a@x.io", "000000"));
        assert!(!f.service.verify_email("b@x.io", &code));
    }

    #[tokio::test]
    async fn opens_account_with_encrypted_number() {
        let f = fixture();
        let opened = open(&f, "a", "a@x.io").await;
        assert_eq!(opened.account_number, "1001-2025-001");
        assert_ne!(opened.account.encrypted_number, opened.account_number);
        assert!(opened.account.password_hash.as_deref().unwrap().starts_with("$argon2"));
        assert_eq!(opened.account.balance, 0);

        let summary = f.service.summary(&principal("a").pseudonymized_id).await.unwrap().unwrap();
        assert_eq!(summary.account_number, "1001-2025-001");
        assert_eq!(summary.owner_name, "name-a");
    }

    #[tokio::test]
    async fn code_is_consumed_after_opening() {
        let f = fixture();
        f.service.send_verification("a@x.io").unwrap();
        let code = f.mailer.last_code_for("a@x.io").unwrap();
        f.service.open_account(&principal("a"), "a@x.io", &code, "pw").await.unwrap();
        assert!(!f.service.verify_email("a@x.io", &code));
    }

    #[tokio::test]
    async fn wrong_code_or_empty_password_is_refused() {
        let f = fixture();
        f.service.send_verification("a@x.io").unwrap();
        let code = f.mailer.last_code_for("a@x.io").unwrap();

        let wrong = f.service.open_account(&principal("a"), "a@x.io", "999999x", "pw").await;
        assert!(matches!(wrong, Err(AccountError::CodeMismatch)));

        let empty = f.service.open_account(&principal("a"), "a@x.io", &code, "").await;
        assert!(matches!(empty, Err(AccountError::InvalidPassword)));
    }

    #[tokio::test]
    async fn one_account_per_owner() {
        let f = fixture();
        open(&f, "a", "a@x.io").await;

        f.service.send_verification("a2@x.io").unwrap();
        let code = f.mailer.last_code_for("a2@x.io").unwrap();
        let second = f.service.open_account(&principal("a"), "a2@x.io", &code, "pw").await;
        assert!(matches!(second, Err(AccountError::AccountAlreadyExists)));
    }

    #[tokio::test]
    async fn recipient_lookup_accepts_unformatted_numbers() {
        let f = fixture();
        open(&f, "a", "a@x.io").await;

        let found = f.service.lookup_recipient("10012025001").await.unwrap().unwrap();
        assert_eq!(found.owner_name, "name-a");
        assert_eq!(found.account_number, "1001-2025-001");
        assert!(f.service.lookup_recipient("1001-2025-999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_is_none_without_account() {
        let f = fixture();
        assert!(f.service.summary(&principal("z").pseudonymized_id).await.unwrap().is_none());
        let history = f.service.history(&principal("z").pseudonymized_id, 10).await;
        assert!(matches!(history, Err(AccountError::NoSuchAccount)));
    }
}
