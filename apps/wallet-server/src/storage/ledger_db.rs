// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger Store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account_id → serialized Account
//! - `accounts_by_owner`: pseudonymized id → account_id
//! - `accounts_by_number`: encrypted account number → account_id
//! - `safeboxes`: pseudonymized id → serialized Safebox
//! - `saving_goals`: goal_id → serialized SavingGoal
//! - `goals_by_safebox`: (safebox_id, goal_id) → ()
//! - `transfers`: transfer_id → serialized TransferRecord
//! - `history`: composite key (account_id|!entry_id) → serialized HistoryEntry
//! - `counters`: sequence name → last issued value
//!
//! ## Atomicity
//!
//! Every logical operation runs inside one redb write transaction through
//! [`LedgerStore::atomically`]. redb admits a single writer at a time, so a
//! balance read and the write that follows it are serializable. If the
//! closure fails, the transaction is aborted and nothing is persisted.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use tracing::warn;

use super::records::{
    Account, HistoryEntry, NewAccount, NewHistoryEntry, NewSavingGoal, Safebox, SavingGoal,
    TransferRecord,
};
use crate::crypto::PseudonymizedId;

// =============================================================================
// Table Definitions
// =============================================================================

const ACCOUNTS: TableDefinition<u64, &[u8]> = TableDefinition::new("accounts");

const ACCOUNTS_BY_OWNER: TableDefinition<&str, u64> = TableDefinition::new("accounts_by_owner");

const ACCOUNTS_BY_NUMBER: TableDefinition<&str, u64> = TableDefinition::new("accounts_by_number");

const SAFEBOXES: TableDefinition<&str, &[u8]> = TableDefinition::new("safeboxes");

const SAVING_GOALS: TableDefinition<u64, &[u8]> = TableDefinition::new("saving_goals");

const GOALS_BY_SAFEBOX: TableDefinition<(u64, u64), ()> = TableDefinition::new("goals_by_safebox");

const TRANSFERS: TableDefinition<u64, &[u8]> = TableDefinition::new("transfers");

/// Key format: `account_id_be | !entry_id_be` for newest-first range scans.
const HISTORY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("history");

const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const SEQ_ACCOUNT: &str = "account_id";
const SEQ_SAFEBOX: &str = "safebox_id";
const SEQ_GOAL: &str = "goal_id";
const SEQ_TRANSFER: &str = "transfer_id";
const SEQ_HISTORY: &str = "history_id";

/// Sequence used for human-facing account numbers.
pub const SEQ_ACCOUNT_NUMBER: &str = "account_number";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to create ledger directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("balance of account {account_id} would become negative ({attempted})")]
    NegativeBalance { account_id: u64, attempted: i64 },

    #[error("safebox balance would become negative ({attempted})")]
    NegativeSafeboxBalance { attempted: i64 },

    #[error("balance overflow")]
    BalanceOverflow,

    #[error("account {0} not found")]
    AccountNotFound(u64),

    #[error("owner already holds an account")]
    AccountAlreadyExists,

    #[error("account number already in use")]
    DuplicateAccountNumber,

    #[error("safebox not found")]
    SafeboxNotFound,

    #[error("saving goal {0} not found")]
    GoalNotFound(u64),

    #[error("ledger storage unavailable")]
    StorageUnavailable,

    #[error("ledger task failed: {0}")]
    Task(String),
}

impl LedgerError {
    /// Whether the caller may retry later.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable)
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Store Abstraction
// =============================================================================

/// Read access to a consistent ledger snapshot.
pub trait LedgerView {
    fn account(&self, account_id: u64) -> LedgerResult<Option<Account>>;
    fn account_by_owner(&self, owner: &PseudonymizedId) -> LedgerResult<Option<Account>>;
    fn account_by_number(&self, encrypted_number: &str) -> LedgerResult<Option<Account>>;
    fn get_balance(&self, account_id: u64) -> LedgerResult<i64>;
    fn safebox(&self, owner: &PseudonymizedId) -> LedgerResult<Option<Safebox>>;
    /// Goals of one safebox in creation order.
    fn goals(&self, safebox_id: u64) -> LedgerResult<Vec<SavingGoal>>;
    fn goal(&self, goal_id: u64) -> LedgerResult<Option<SavingGoal>>;
    fn transfer(&self, transfer_id: u64) -> LedgerResult<Option<TransferRecord>>;
    /// Newest first.
    fn history(&self, account_id: u64, limit: usize) -> LedgerResult<Vec<HistoryEntry>>;
}

/// Mutations available inside one atomic unit.
pub trait LedgerTxn: LedgerView {
    /// Next value of a named sequence, starting at 1.
    fn next_sequence(&mut self, name: &str) -> LedgerResult<u64>;
    fn insert_account(&mut self, account: NewAccount) -> LedgerResult<Account>;
    /// Rejects negative amounts with [`LedgerError::NegativeBalance`].
    fn set_balance(&mut self, account_id: u64, amount: i64) -> LedgerResult<()>;
    fn record_transfer(&mut self, from: u64, to: u64, amount: i64, memo: &str) -> LedgerResult<TransferRecord>;
    fn record_history(&mut self, entry: NewHistoryEntry) -> LedgerResult<HistoryEntry>;
    /// Return the owner's safebox, creating an empty one if absent.
    fn open_safebox(&mut self, owner: &PseudonymizedId) -> LedgerResult<Safebox>;
    fn set_safebox_balance(&mut self, owner: &PseudonymizedId, amount: i64) -> LedgerResult<()>;
    fn insert_goal(&mut self, goal: NewSavingGoal) -> LedgerResult<SavingGoal>;
    /// Rejects negative amounts with [`LedgerError::NegativeSafeboxBalance`].
    fn set_goal_saved(&mut self, goal_id: u64, amount: i64) -> LedgerResult<()>;
}

/// Storage backend able to run all-or-nothing units of work.
pub trait LedgerStore: Send + Sync + 'static {
    /// Run `op` in one serializable write transaction. Commits on `Ok`,
    /// aborts on `Err`.
    fn atomically<T, E>(&self, op: impl FnOnce(&mut dyn LedgerTxn) -> Result<T, E>) -> Result<T, E>
    where
        E: From<LedgerError>;

    /// Run `op` against a read snapshot.
    fn snapshot<T, E>(&self, op: impl FnOnce(&dyn LedgerView) -> Result<T, E>) -> Result<T, E>
    where
        E: From<LedgerError>;
}

// =============================================================================
// Key Helpers
// =============================================================================

fn history_key(account_id: u64, entry_id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&account_id.to_be_bytes());
    // Inverted id so newer entries sort first
    key[8..].copy_from_slice(&(!entry_id).to_be_bytes());
    key
}

fn history_range(account_id: u64) -> ([u8; 16], [u8; 16]) {
    (history_key(account_id, u64::MAX), history_key(account_id, 0))
}

fn load<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> LedgerResult<Option<T>> {
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn load_by_str<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> LedgerResult<Option<T>> {
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn lookup_id(table: &impl ReadableTable<&'static str, u64>, key: &str) -> LedgerResult<Option<u64>> {
    Ok(table.get(key)?.map(|v| v.value()))
}

// =============================================================================
// Views
// =============================================================================

struct RedbReader<'a> {
    txn: &'a ReadTransaction,
}

struct RedbWriter<'a> {
    txn: &'a WriteTransaction,
}

/// Both transaction kinds expose `open_table` returning a `ReadableTable`,
/// so the read side is written once for either.
macro_rules! impl_ledger_view {
    ($ty:ident) => {
        impl LedgerView for $ty<'_> {
            fn account(&self, account_id: u64) -> LedgerResult<Option<Account>> {
                let table = self.txn.open_table(ACCOUNTS)?;
                load(&table, account_id)
            }

            fn account_by_owner(&self, owner: &PseudonymizedId) -> LedgerResult<Option<Account>> {
                let index = self.txn.open_table(ACCOUNTS_BY_OWNER)?;
                match lookup_id(&index, owner.as_str())? {
                    Some(id) => self.account(id),
                    None => Ok(None),
                }
            }

            fn account_by_number(&self, encrypted_number: &str) -> LedgerResult<Option<Account>> {
                let index = self.txn.open_table(ACCOUNTS_BY_NUMBER)?;
                match lookup_id(&index, encrypted_number)? {
                    Some(id) => self.account(id),
                    None => Ok(None),
                }
            }

            fn get_balance(&self, account_id: u64) -> LedgerResult<i64> {
                self.account(account_id)?
                    .map(|a| a.balance)
                    .ok_or(LedgerError::AccountNotFound(account_id))
            }

            fn safebox(&self, owner: &PseudonymizedId) -> LedgerResult<Option<Safebox>> {
                let table = self.txn.open_table(SAFEBOXES)?;
                load_by_str(&table, owner.as_str())
            }

            fn goals(&self, safebox_id: u64) -> LedgerResult<Vec<SavingGoal>> {
                let index = self.txn.open_table(GOALS_BY_SAFEBOX)?;
                let table = self.txn.open_table(SAVING_GOALS)?;
                let mut goals = Vec::new();
                for entry in index.range((safebox_id, 0)..=(safebox_id, u64::MAX))? {
                    let (key, _) = entry?;
                    let (_, goal_id) = key.value();
                    if let Some(goal) = load(&table, goal_id)? {
                        goals.push(goal);
                    }
                }
                Ok(goals)
            }

            fn goal(&self, goal_id: u64) -> LedgerResult<Option<SavingGoal>> {
                let table = self.txn.open_table(SAVING_GOALS)?;
                load(&table, goal_id)
            }

            fn transfer(&self, transfer_id: u64) -> LedgerResult<Option<TransferRecord>> {
                let table = self.txn.open_table(TRANSFERS)?;
                load(&table, transfer_id)
            }

            fn history(&self, account_id: u64, limit: usize) -> LedgerResult<Vec<HistoryEntry>> {
                let table = self.txn.open_table(HISTORY)?;
                let (start, end) = history_range(account_id);
                let mut entries = Vec::new();
                for item in table.range(start.as_slice()..=end.as_slice())? {
                    if entries.len() >= limit {
                        break;
                    }
                    let (_, value) = item?;
                    entries.push(serde_json::from_slice(value.value())?);
                }
                Ok(entries)
            }
        }
    };
}

impl_ledger_view!(RedbReader);
impl_ledger_view!(RedbWriter);

impl LedgerTxn for RedbWriter<'_> {
    fn next_sequence(&mut self, name: &str) -> LedgerResult<u64> {
        let mut table = self.txn.open_table(COUNTERS)?;
        let next = lookup_id(&table, name)?.unwrap_or(0) + 1;
        table.insert(name, next)?;
        Ok(next)
    }

    fn insert_account(&mut self, new: NewAccount) -> LedgerResult<Account> {
        {
            let by_owner = self.txn.open_table(ACCOUNTS_BY_OWNER)?;
            if lookup_id(&by_owner, new.owner.as_str())?.is_some() {
                return Err(LedgerError::AccountAlreadyExists);
            }
            let by_number = self.txn.open_table(ACCOUNTS_BY_NUMBER)?;
            if lookup_id(&by_number, &new.encrypted_number)?.is_some() {
                return Err(LedgerError::DuplicateAccountNumber);
            }
        }

        let account = Account {
            account_id: self.next_sequence(SEQ_ACCOUNT)?,
            owner: new.owner,
            owner_name: new.owner_name,
            encrypted_number: new.encrypted_number,
            balance: 0,
            password_hash: new.password_hash,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&account)?;

        self.txn.open_table(ACCOUNTS)?.insert(account.account_id, json.as_slice())?;
        self.txn
            .open_table(ACCOUNTS_BY_OWNER)?
            .insert(account.owner.as_str(), account.account_id)?;
        self.txn
            .open_table(ACCOUNTS_BY_NUMBER)?
            .insert(account.encrypted_number.as_str(), account.account_id)?;
        Ok(account)
    }

    fn set_balance(&mut self, account_id: u64, amount: i64) -> LedgerResult<()> {
        if amount < 0 {
            return Err(LedgerError::NegativeBalance {
                account_id,
                attempted: amount,
            });
        }
        let mut table = self.txn.open_table(ACCOUNTS)?;
        let mut account: Account = load(&table, account_id)?.ok_or(LedgerError::AccountNotFound(account_id))?;
        account.balance = amount;
        let json = serde_json::to_vec(&account)?;
        table.insert(account_id, json.as_slice())?;
        Ok(())
    }

    fn record_transfer(&mut self, from: u64, to: u64, amount: i64, memo: &str) -> LedgerResult<TransferRecord> {
        let record = TransferRecord {
            transfer_id: self.next_sequence(SEQ_TRANSFER)?,
            from_account_id: from,
            to_account_id: to,
            amount,
            memo: memo.to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_vec(&record)?;
        self.txn.open_table(TRANSFERS)?.insert(record.transfer_id, json.as_slice())?;
        Ok(record)
    }

    fn record_history(&mut self, new: NewHistoryEntry) -> LedgerResult<HistoryEntry> {
        let entry = HistoryEntry {
            entry_id: self.next_sequence(SEQ_HISTORY)?,
            account_id: new.account_id,
            direction: new.direction,
            amount: new.amount,
            memo: new.memo,
            timestamp: Utc::now(),
            transfer_id: new.transfer_id,
            counterparty_account_id: new.counterparty_account_id,
        };
        let key = history_key(entry.account_id, entry.entry_id);
        let json = serde_json::to_vec(&entry)?;
        self.txn.open_table(HISTORY)?.insert(key.as_slice(), json.as_slice())?;
        Ok(entry)
    }

    fn open_safebox(&mut self, owner: &PseudonymizedId) -> LedgerResult<Safebox> {
        if let Some(existing) = self.safebox(owner)? {
            return Ok(existing);
        }
        let safebox = Safebox {
            safebox_id: self.next_sequence(SEQ_SAFEBOX)?,
            owner: owner.clone(),
            balance: 0,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&safebox)?;
        self.txn.open_table(SAFEBOXES)?.insert(owner.as_str(), json.as_slice())?;
        Ok(safebox)
    }

    fn set_safebox_balance(&mut self, owner: &PseudonymizedId, amount: i64) -> LedgerResult<()> {
        if amount < 0 {
            return Err(LedgerError::NegativeSafeboxBalance { attempted: amount });
        }
        let mut table = self.txn.open_table(SAFEBOXES)?;
        let mut safebox: Safebox = load_by_str(&table, owner.as_str())?.ok_or(LedgerError::SafeboxNotFound)?;
        safebox.balance = amount;
        let json = serde_json::to_vec(&safebox)?;
        table.insert(owner.as_str(), json.as_slice())?;
        Ok(())
    }

    fn insert_goal(&mut self, new: NewSavingGoal) -> LedgerResult<SavingGoal> {
        let goal = SavingGoal {
            goal_id: self.next_sequence(SEQ_GOAL)?,
            safebox_id: new.safebox_id,
            title: new.title,
            target_amount: new.target_amount,
            start_date: new.start_date,
            end_date: new.end_date,
            cadence: new.cadence,
            saved_amount: 0,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&goal)?;
        self.txn.open_table(SAVING_GOALS)?.insert(goal.goal_id, json.as_slice())?;
        self.txn
            .open_table(GOALS_BY_SAFEBOX)?
            .insert((goal.safebox_id, goal.goal_id), ())?;
        Ok(goal)
    }

    fn set_goal_saved(&mut self, goal_id: u64, amount: i64) -> LedgerResult<()> {
        if amount < 0 {
            return Err(LedgerError::NegativeSafeboxBalance { attempted: amount });
        }
        let mut table = self.txn.open_table(SAVING_GOALS)?;
        let mut goal: SavingGoal = load(&table, goal_id)?.ok_or(LedgerError::GoalNotFound(goal_id))?;
        goal.saved_amount = amount;
        let json = serde_json::to_vec(&goal)?;
        table.insert(goal_id, json.as_slice())?;
        Ok(())
    }
}

// =============================================================================
// LedgerDatabase
// =============================================================================

/// Embedded ACID ledger.
pub struct LedgerDatabase {
    db: Database,
}

impl LedgerDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(ACCOUNTS_BY_OWNER)?;
            let _ = write_txn.open_table(ACCOUNTS_BY_NUMBER)?;
            let _ = write_txn.open_table(SAFEBOXES)?;
            let _ = write_txn.open_table(SAVING_GOALS)?;
            let _ = write_txn.open_table(GOALS_BY_SAFEBOX)?;
            let _ = write_txn.open_table(TRANSFERS)?;
            let _ = write_txn.open_table(HISTORY)?;
            let _ = write_txn.open_table(COUNTERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl LedgerStore for LedgerDatabase {
    fn atomically<T, E>(&self, op: impl FnOnce(&mut dyn LedgerTxn) -> Result<T, E>) -> Result<T, E>
    where
        E: From<LedgerError>,
    {
        let write_txn = self.db.begin_write().map_err(LedgerError::from)?;
        let outcome = {
            let mut writer = RedbWriter { txn: &write_txn };
            op(&mut writer)
        };
        match outcome {
            Ok(value) => {
                write_txn.commit().map_err(LedgerError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = write_txn.abort() {
                    warn!(error = %abort, "Failed to abort ledger transaction");
                }
                Err(e)
            }
        }
    }

    fn snapshot<T, E>(&self, op: impl FnOnce(&dyn LedgerView) -> Result<T, E>) -> Result<T, E>
    where
        E: From<LedgerError>,
    {
        let read_txn = self.db.begin_read().map_err(LedgerError::from)?;
        let reader = RedbReader { txn: &read_txn };
        op(&reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::Direction;
    use tempfile::tempdir;

    fn owner(tag: char) -> PseudonymizedId {
        PseudonymizedId::from_raw(tag.to_string().repeat(64))
    }

    fn open() -> (tempfile::TempDir, LedgerDatabase) {
        let dir = tempdir().unwrap();
        let db = LedgerDatabase::open(&dir.path().join("ledger.redb")).unwrap();
        (dir, db)
    }

    fn new_account(tag: char) -> NewAccount {
        NewAccount {
            owner: owner(tag),
            owner_name: format!("owner-{tag}"),
            encrypted_number: format!("enc-{tag}"),
            password_hash: None,
        }
    }

    #[test]
    fn insert_and_find_account_by_indexes() {
        let (_dir, db) = open();
        let created = db
            .atomically(|txn| txn.insert_account(new_account('a')))
            .unwrap();
        assert_eq!(created.account_id, 1);
        assert_eq!(created.balance, 0);

        db.snapshot::<_, LedgerError>(|view| {
            assert_eq!(view.account_by_owner(&owner('a'))?.unwrap(), created);
            assert_eq!(view.account_by_number("enc-a")?.unwrap(), created);
            assert!(view.account_by_number("enc-z")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn one_account_per_owner() {
        let (_dir, db) = open();
        db.atomically(|txn| txn.insert_account(new_account('a'))).unwrap();

        let mut dup = new_account('a');
        dup.encrypted_number = "enc-other".to_string();
        let err = db.atomically(|txn| txn.insert_account(dup)).unwrap_err();
        assert!(matches!(err, LedgerError::AccountAlreadyExists));
    }

    #[test]
    fn set_balance_rejects_negative() {
        let (_dir, db) = open();
        let acct = db.atomically(|txn| txn.insert_account(new_account('a'))).unwrap();

        let err = db
            .atomically(|txn| txn.set_balance(acct.account_id, -1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NegativeBalance { attempted: -1, .. }));

        let balance = db.snapshot(|v| v.get_balance(acct.account_id)).unwrap();
        assert_eq!(balance, 0);
    }

    #[test]
    fn failed_unit_rolls_back_every_write() {
        let (_dir, db) = open();
        let acct = db.atomically(|txn| txn.insert_account(new_account('a'))).unwrap();

        let result: LedgerResult<()> = db.atomically(|txn| {
            txn.set_balance(acct.account_id, 500)?;
            txn.record_transfer(acct.account_id, 99, 500, "never")?;
            Err(LedgerError::BalanceOverflow)
        });
        assert!(result.is_err());

        db.snapshot::<_, LedgerError>(|v| {
            assert_eq!(v.get_balance(acct.account_id)?, 0);
            assert!(v.transfer(1)?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn history_is_newest_first_and_scoped_to_account() {
        let (_dir, db) = open();
        db.atomically::<_, LedgerError>(|txn| {
            for (account_id, amount) in [(1, 10), (2, 20), (1, 30), (1, 40)] {
                txn.record_history(NewHistoryEntry {
                    account_id,
                    direction: Direction::In,
                    amount,
                    memo: String::new(),
                    transfer_id: None,
                    counterparty_account_id: None,
                })?;
            }
            Ok(())
        })
        .unwrap();

        let amounts: Vec<i64> = db
            .snapshot(|v| v.history(1, 10))
            .unwrap()
            .into_iter()
            .map(|e| e.amount)
            .collect();
        assert_eq!(amounts, vec![40, 30, 10]);

        let limited = db.snapshot(|v| v.history(1, 2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn safebox_is_created_once() {
        let (_dir, db) = open();
        let first = db.atomically(|txn| txn.open_safebox(&owner('s'))).unwrap();
        db.atomically(|txn| txn.set_safebox_balance(&owner('s'), 700)).unwrap();
        let second = db.atomically(|txn| txn.open_safebox(&owner('s'))).unwrap();
        assert_eq!(first.safebox_id, second.safebox_id);
        assert_eq!(second.balance, 700);
    }

    fn new_goal(safebox_id: u64, title: &str) -> NewSavingGoal {
        NewSavingGoal {
            safebox_id,
            title: title.to_string(),
            target_amount: 10_000,
            start_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            cadence: crate::storage::records::Cadence::Daily,
        }
    }

    #[test]
    fn goals_are_listed_per_safebox_from_the_index() {
        let (_dir, db) = open();
        db.atomically::<_, LedgerError>(|txn| {
            let a = txn.open_safebox(&owner('a'))?;
            let b = txn.open_safebox(&owner('b'))?;
            txn.insert_goal(new_goal(a.safebox_id, "a-1"))?;
            txn.insert_goal(new_goal(b.safebox_id, "b-1"))?;
            txn.insert_goal(new_goal(a.safebox_id, "a-2"))?;
            Ok(())
        })
        .unwrap();

        let titles: Vec<String> = db
            .snapshot(|v| v.goals(1))
            .unwrap()
            .into_iter()
            .map(|g| g.title)
            .collect();
        assert_eq!(titles, vec!["a-1", "a-2"]);
        assert_eq!(db.snapshot(|v| v.goals(2)).unwrap().len(), 1);
        assert!(db.snapshot(|v| v.goals(3)).unwrap().is_empty());
    }

    #[test]
    fn goal_saved_amount_is_updated_in_place() {
        let (_dir, db) = open();
        let goal = db
            .atomically::<_, LedgerError>(|txn| {
                let sb = txn.open_safebox(&owner('a'))?;
                txn.insert_goal(new_goal(sb.safebox_id, "trip"))
            })
            .unwrap();
        assert_eq!(goal.saved_amount, 0);

        db.atomically(|txn| txn.set_goal_saved(goal.goal_id, 2_500)).unwrap();
        let stored = db.snapshot(|v| v.goal(goal.goal_id)).unwrap().unwrap();
        assert_eq!(stored.saved_amount, 2_500);

        let missing = db.atomically(|txn| txn.set_goal_saved(99, 1)).unwrap_err();
        assert!(matches!(missing, LedgerError::GoalNotFound(99)));
        let negative = db.atomically(|txn| txn.set_goal_saved(goal.goal_id, -1)).unwrap_err();
        assert!(matches!(negative, LedgerError::NegativeSafeboxBalance { attempted: -1 }));
    }

    #[test]
    fn open_reports_unusable_directory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let result = LedgerDatabase::open(&blocker.join("ledger.redb"));
        assert!(matches!(result, Err(LedgerError::Io(_))));
    }

    #[test]
    fn sequences_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.redb");
        {
            let db = LedgerDatabase::open(&path).unwrap();
            assert_eq!(db.atomically(|t| t.next_sequence(SEQ_ACCOUNT_NUMBER)).unwrap(), 1);
            assert_eq!(db.atomically(|t| t.next_sequence(SEQ_ACCOUNT_NUMBER)).unwrap(), 2);
        }
        let db = LedgerDatabase::open(&path).unwrap();
        assert_eq!(db.atomically(|t| t.next_sequence(SEQ_ACCOUNT_NUMBER)).unwrap(), 3);
    }
}
