// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Banking service domain: ledger front, accounts, transfers and safeboxes.

pub mod accounts;
pub mod ledger;
pub mod mail;
pub mod safebox;
pub mod transfer;

pub use accounts::{
    AccountError, AccountService, AccountSummary, HistoryItem, OpenedAccount, RecipientInfo,
    DEFAULT_HISTORY_LIMIT,
};
pub use ledger::{Ledger, DEFAULT_LEDGER_TIMEOUT};
pub use mail::{LogMailer, MailError, MailSender};
pub use safebox::{Allocation, GoalDetail, GoalRequest, SafeboxError, SafeboxOverview, SafeboxService};
pub use transfer::{Party, TransferError, TransferReceipt, TransferRequest, TransferService};
