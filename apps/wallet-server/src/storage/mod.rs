// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in embedded redb databases under `DATA_DIR`;
//! short-lived secrets live in process memory.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   identity.redb   # identities (identity service)
//!   ledger.redb     # accounts, safeboxes, goals, transfers, history (banking)
//! ```
//!
//! ## Important Notes
//!
//! - Raw emails and plaintext account numbers are never written to disk.
//! - [`expiring::ExpiringStore`] contents (verification codes, OAuth state)
//!   do not survive a restart and are not shared between instances.

pub mod expiring;
pub mod identity_db;
pub mod ledger_db;
pub mod records;

pub use expiring::{run_sweeper, ExpiringStore, Sweep};
pub use identity_db::{IdentityDatabase, IdentityDbError, IdentityStore, NewIdentity};
pub use ledger_db::{LedgerDatabase, LedgerError, LedgerResult, LedgerStore, LedgerTxn, LedgerView};
pub use records::{
    Account, Cadence, Direction, HistoryEntry, Identity, NewAccount, NewHistoryEntry,
    NewSavingGoal, Provider, Safebox, SavingGoal, TransferRecord,
};
