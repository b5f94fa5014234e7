// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Orchestrator
//!
//! Moves money between two accounts:
//!
//! 1. Resolve the sender's account from the caller's pseudonymized id.
//! 2. Verify the transfer password against the stored Argon2 hash.
//! 3. Encrypt the recipient's number and resolve it.
//! 4. Refuse self-transfers and non-positive amounts.
//! 5. Inside one ledger unit: re-read both balances, refuse overdrafts,
//!    write both balances, one [`TransferRecord`] and the `OUT`/`IN`
//!    history legs.
//!
//! Steps 1-4 are read-only and run outside the write gate. The balance check
//! in step 5 runs inside the serializable unit, so two concurrent transfers
//! from the same account cannot both spend the same funds.

use std::sync::Arc;

use tracing::{info, warn};

use super::accounts::normalize_account_number;
use super::ledger::Ledger;
use crate::crypto::{CipherError, FieldCipher, PasswordVerifier, PseudonymizedId};
use crate::storage::{Direction, LedgerError, LedgerStore, NewHistoryEntry, TransferRecord};

/// Which side of the transfer could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Sender,
    Recipient,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{0:?} account does not exist")]
    NoSuchAccount(Party),

    #[error("transfer password does not match")]
    BadCredential,

    #[error("cannot transfer to the same account")]
    SelfTransferNotAllowed,

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TransferError {
    /// Message shown to the end user. Never includes numbers or secrets.
    pub fn user_message(&self) -> &'static str {
        match self {
            TransferError::NoSuchAccount(Party::Sender) => "You do not have an account to send from.",
            TransferError::NoSuchAccount(Party::Recipient) => "The recipient account does not exist.",
            TransferError::BadCredential => "The account password is incorrect.",
            TransferError::SelfTransferNotAllowed => "You cannot transfer to your own account.",
            TransferError::InvalidAmount => "The transfer amount must be greater than zero.",
            TransferError::InsufficientFunds => "Insufficient balance.",
            TransferError::Cipher(_) | TransferError::Ledger(_) => "The transfer could not be processed.",
        }
    }

    /// Business-rule failures are reported in the response body; the rest
    /// are server faults.
    pub fn is_business_failure(&self) -> bool {
        !matches!(self, TransferError::Cipher(_) | TransferError::Ledger(_))
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_owner: PseudonymizedId,
    pub to_account_number: String,
    pub amount: i64,
    pub memo: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub record: TransferRecord,
    pub recipient_name: String,
    /// Normalized plaintext recipient number.
    pub to_account_number: String,
    pub from_balance_after: i64,
}

pub struct TransferService<S> {
    ledger: Ledger<S>,
    cipher: Arc<FieldCipher>,
    passwords: PasswordVerifier,
}

impl<S: LedgerStore> TransferService<S> {
    pub fn new(ledger: Ledger<S>, cipher: Arc<FieldCipher>) -> Self {
        Self {
            ledger,
            cipher,
            passwords: PasswordVerifier::new(),
        }
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let TransferRequest {
            from_owner,
            to_account_number,
            amount,
            memo,
            password,
        } = request;

        // 1. Sender
        let from = self
            .ledger
            .read(move |v| v.account_by_owner(&from_owner))
            .await?
            .ok_or(TransferError::NoSuchAccount(Party::Sender))?;

        // 2. Password
        if !self
            .passwords
            .verify_blocking(password, from.password_hash.clone())
            .await
        {
            warn!(account_id = from.account_id, "Transfer refused: bad credential");
            return Err(TransferError::BadCredential);
        }

        // 3. Recipient
        let to_number = normalize_account_number(&to_account_number);
        let encrypted_to = self.cipher.encrypt(&to_number)?;
        let to = self
            .ledger
            .read(move |v| v.account_by_number(&encrypted_to))
            .await?
            .ok_or(TransferError::NoSuchAccount(Party::Recipient))?;

        // 4. Shape checks
        if from.account_id == to.account_id {
            return Err(TransferError::SelfTransferNotAllowed);
        }
        if amount <= 0 {
            return Err(TransferError::InvalidAmount);
        }

        // 5. Atomic movement
        let (from_id, to_id) = (from.account_id, to.account_id);
        let (record, from_balance_after) = self
            .ledger
            .write(move |txn| {
                let from_balance = txn.get_balance(from_id)?;
                let to_balance = txn.get_balance(to_id)?;
                if from_balance < amount {
                    return Err(TransferError::InsufficientFunds);
                }
                let from_after = from_balance - amount;
                let to_after = to_balance
                    .checked_add(amount)
                    .ok_or(LedgerError::BalanceOverflow)?;

                txn.set_balance(from_id, from_after)?;
                txn.set_balance(to_id, to_after)?;
                let record = txn.record_transfer(from_id, to_id, amount, &memo)?;
                for (account_id, direction, counterparty) in
                    [(from_id, Direction::Out, to_id), (to_id, Direction::In, from_id)]
                {
                    txn.record_history(NewHistoryEntry {
                        account_id,
                        direction,
                        amount,
                        memo: memo.clone(),
                        transfer_id: Some(record.transfer_id),
                        counterparty_account_id: Some(counterparty),
                    })?;
                }
                Ok((record, from_after))
            })
            .await?;

        info!(
            transfer_id = record.transfer_id,
            from_account_id = from_id,
            to_account_id = to_id,
            amount,
            "Transfer completed"
        );

        Ok(TransferReceipt {
            record,
            recipient_name: to.owner_name,
            to_account_number: to_number,
            from_balance_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banking::ledger::DEFAULT_LEDGER_TIMEOUT;
    use crate::storage::{LedgerDatabase, LedgerTxn, NewAccount};
    use tempfile::tempdir;

    const PASSWORD: &str = "4321";

    struct Bank {
        _dir: tempfile::TempDir,
        ledger: Ledger<LedgerDatabase>,
        cipher: Arc<FieldCipher>,
        service: TransferService<LedgerDatabase>,
    }

    fn owner(tag: &str) -> PseudonymizedId {
        PseudonymizedId::from_raw(tag.repeat(64))
    }

    fn bank() -> Bank {
        let dir = tempdir().unwrap();
        let db = LedgerDatabase::open(&dir.path().join("ledger.redb")).unwrap();
        let ledger = Ledger::new(Arc::new(db), DEFAULT_LEDGER_TIMEOUT);
        let cipher = Arc::new(FieldCipher::new("transfer-test-cipher-key"));
        let service = TransferService::new(ledger.clone(), Arc::clone(&cipher));
        Bank {
            _dir: dir,
            ledger,
            cipher,
            service,
        }
    }

    /// Open an account directly in the ledger with a starting balance.
    async fn seed(bank: &Bank, tag: &str, number: &str, balance: i64, with_password: bool) -> u64 {
        let hash = with_password.then(|| PasswordVerifier::new().hash(PASSWORD).unwrap());
        let new = NewAccount {
            owner: owner(tag),
            owner_name: format!("name-{tag}"),
            encrypted_number: bank.cipher.encrypt(number).unwrap(),
            password_hash: hash,
        };
        bank.ledger
            .write(move |txn: &mut dyn LedgerTxn| {
                let a = txn.insert_account(new)?;
                txn.set_balance(a.account_id, balance)?;
                Ok::<_, LedgerError>(a.account_id)
            })
            .await
            .unwrap()
    }

    async fn balance(bank: &Bank, id: u64) -> i64 {
        bank.ledger.read(move |v| v.get_balance(id)).await.unwrap()
    }

    fn request(from: &str, to: &str, amount: i64, password: &str) -> TransferRequest {
        TransferRequest {
            from_owner: owner(from),
            to_account_number: to.to_string(),
            amount,
            memo: "rent".to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn successful_transfer_moves_funds_and_writes_history() {
        let bank = bank();
        let a = seed(&bank, "a", "1001-2025-001", 10_000, true).await;
        let b = seed(&bank, "b", "1001-2025-002", 0, true).await;

        let receipt = bank
            .service
            .transfer(request("a", "1001-2025-002", 3_000, PASSWORD))
            .await
            .unwrap();

        assert_eq!(balance(&bank, a).await, 7_000);
        assert_eq!(balance(&bank, b).await, 3_000);
        assert_eq!(receipt.from_balance_after, 7_000);
        assert_eq!(receipt.recipient_name, "name-b");
        assert_eq!(receipt.record.amount, 3_000);

        let (out, inn) = bank
            .ledger
            .read(move |v| Ok::<_, LedgerError>((v.history(a, 10)?, v.history(b, 10)?)))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].direction, Direction::Out);
        assert_eq!(out[0].counterparty_account_id, Some(b));
        assert_eq!(inn.len(), 1);
        assert_eq!(inn[0].direction, Direction::In);
        assert_eq!(inn[0].transfer_id, Some(receipt.record.transfer_id));
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_balances_untouched() {
        let bank = bank();
        let a = seed(&bank, "a", "1001-2025-001", 10_000, true).await;
        let b = seed(&bank, "b", "1001-2025-002", 0, true).await;

        let err = bank
            .service
            .transfer(request("a", "1001-2025-002", 20_000, PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds));
        assert_eq!(balance(&bank, a).await, 10_000);
        assert_eq!(balance(&bank, b).await, 0);
        assert!(bank.ledger.read(move |v| v.history(a, 10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_transfer_is_refused() {
        let bank = bank();
        let a = seed(&bank, "a", "1001-2025-001", 5_000, true).await;
        let err = bank
            .service
            .transfer(request("a", "10012025001", 1_000, PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SelfTransferNotAllowed));
        assert_eq!(balance(&bank, a).await, 5_000);
    }

    #[tokio::test]
    async fn wrong_or_missing_password_is_bad_credential() {
        let bank = bank();
        seed(&bank, "a", "1001-2025-001", 5_000, true).await;
        seed(&bank, "n", "1001-2025-003", 5_000, false).await;
        seed(&bank, "b", "1001-2025-002", 0, true).await;

        let wrong = bank.service.transfer(request("a", "1001-2025-002", 10, "0000")).await;
        assert!(matches!(wrong, Err(TransferError::BadCredential)));

        let no_hash = bank.service.transfer(request("n", "1001-2025-002", 10, PASSWORD)).await;
        assert!(matches!(no_hash, Err(TransferError::BadCredential)));
    }

    #[tokio::test]
    async fn unknown_parties_are_reported_by_side() {
        let bank = bank();
        seed(&bank, "a", "1001-2025-001", 5_000, true).await;

        let sender = bank.service.transfer(request("x", "1001-2025-001", 10, PASSWORD)).await;
        assert!(matches!(sender, Err(TransferError::NoSuchAccount(Party::Sender))));

        let recipient = bank.service.transfer(request("a", "1001-2025-404", 10, PASSWORD)).await;
        assert!(matches!(recipient, Err(TransferError::NoSuchAccount(Party::Recipient))));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_invalid() {
        let bank = bank();
        seed(&bank, "a", "1001-2025-001", 5_000, true).await;
        seed(&bank, "b", "1001-2025-002", 0, true).await;

        for amount in [0, -500] {
            let err = bank
                .service
                .transfer(request("a", "1001-2025-002", amount, PASSWORD))
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::InvalidAmount));
        }
    }

    #[tokio::test]
    async fn concurrent_transfers_never_overdraw() {
        let bank = Arc::new(bank());
        let a = seed(&bank, "a", "1001-2025-001", 10_000, true).await;
        let b = seed(&bank, "b", "1001-2025-002", 0, true).await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let bank = Arc::clone(&bank);
            handles.push(tokio::spawn(async move {
                bank.service
                    .transfer(request("a", "1001-2025-002", 3_000, PASSWORD))
                    .await
                    .is_ok()
            }));
        }
        let mut succeeded = 0;
        for h in handles {
            if h.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 3);
        let (after_a, after_b) = (balance(&bank, a).await, balance(&bank, b).await);
        assert_eq!(after_a, 1_000);
        assert_eq!(after_a + after_b, 10_000);
    }

    #[test]
    fn messages_do_not_leak_details() {
        assert_eq!(TransferError::InsufficientFunds.user_message(), "Insufficient balance.");
        assert!(TransferError::BadCredential.is_business_failure());
        assert!(!TransferError::Ledger(LedgerError::StorageUnavailable).is_business_failure());
    }
}
