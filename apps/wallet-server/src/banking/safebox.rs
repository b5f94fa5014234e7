// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Safebox allocation and saving goals.
//!
//! Allocation follows the same contract as a transfer: the account debit,
//! the lazy safebox creation, the safebox credit, the optional goal credit
//! and the history row are one ledger unit.

use chrono::NaiveDate;
use tracing::info;

use super::ledger::Ledger;
use crate::crypto::PseudonymizedId;
use crate::storage::{
    Cadence, Direction, LedgerError, LedgerStore, NewHistoryEntry, NewSavingGoal, SavingGoal,
};

/// History memo written on the account for each allocation.
pub const SAFEBOX_DEPOSIT_MEMO: &str = "Safebox deposit";

#[derive(Debug, thiserror::Error)]
pub enum SafeboxError {
    #[error("no account exists for this user")]
    NoSuchAccount,

    #[error("no safebox exists for this user")]
    NoSafebox,

    #[error("saving goal not found in this safebox")]
    NoSuchGoal,

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("goal start date is after its end date")]
    InvalidPeriod,

    #[error("goal title must not be empty")]
    InvalidTitle,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SafeboxError {
    /// Message shown to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            SafeboxError::NoSuchAccount => "You do not have an account yet.",
            SafeboxError::NoSafebox => "You do not have a safebox yet.",
            SafeboxError::NoSuchGoal => "The saving goal does not exist.",
            SafeboxError::InvalidAmount => "The amount must be greater than zero.",
            SafeboxError::InsufficientFunds => "Insufficient balance.",
            SafeboxError::InvalidPeriod => "The start date must not be after the end date.",
            SafeboxError::InvalidTitle => "The goal title must not be empty.",
            SafeboxError::Ledger(_) => "The safebox request could not be processed.",
        }
    }

    /// Same split as transfers: ledger faults are server errors, the rest
    /// are reported in the response body.
    pub fn is_business_failure(&self) -> bool {
        !matches!(self, SafeboxError::Ledger(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub account_balance: i64,
    pub safebox_balance: i64,
    /// Saved total of the credited goal, if one was named.
    pub goal_saved: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalDetail {
    pub goal: SavingGoal,
    pub safebox_balance: i64,
}

impl GoalDetail {
    pub fn remaining_amount(&self) -> i64 {
        self.goal.target_amount.saturating_sub(self.goal.saved_amount).max(0)
    }

    /// Whole percent of the target reached, capped at 100.
    pub fn progress_percent(&self) -> u8 {
        if self.goal.target_amount <= 0 {
            return 0;
        }
        let pct = (i128::from(self.goal.saved_amount) * 100 / i128::from(self.goal.target_amount)).clamp(0, 100);
        pct as u8
    }
}

#[derive(Debug, Clone)]
pub struct GoalRequest {
    pub title: String,
    pub target_amount: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cadence: Cadence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeboxOverview {
    pub account_balance: i64,
    /// `None` until the first allocation.
    pub safebox_balance: Option<i64>,
    pub goals: Vec<SavingGoal>,
    pub total_assets: i64,
}

pub struct SafeboxService<S> {
    ledger: Ledger<S>,
}

impl<S: LedgerStore> SafeboxService<S> {
    pub fn new(ledger: Ledger<S>) -> Self {
        Self { ledger }
    }

    /// Move `amount` from the owner's account into their safebox, crediting
    /// `goal_id` when given. The goal must belong to the owner's safebox.
    pub async fn allocate(
        &self,
        owner: &PseudonymizedId,
        amount: i64,
        goal_id: Option<u64>,
    ) -> Result<Allocation, SafeboxError> {
        if amount <= 0 {
            return Err(SafeboxError::InvalidAmount);
        }
        let owner = owner.clone();
        let allocation = self
            .ledger
            .write(move |txn| {
                let account = txn.account_by_owner(&owner)?.ok_or(SafeboxError::NoSuchAccount)?;
                let balance = txn.get_balance(account.account_id)?;
                if balance < amount {
                    return Err(SafeboxError::InsufficientFunds);
                }
                let safebox = txn.open_safebox(&owner)?;
                let safebox_after = safebox
                    .balance
                    .checked_add(amount)
                    .ok_or(LedgerError::BalanceOverflow)?;
                let account_after = balance - amount;

                let goal_saved = match goal_id {
                    Some(goal_id) => {
                        let goal = txn
                            .goal(goal_id)?
                            .filter(|g| g.safebox_id == safebox.safebox_id)
                            .ok_or(SafeboxError::NoSuchGoal)?;
                        let saved = goal
                            .saved_amount
                            .checked_add(amount)
                            .ok_or(LedgerError::BalanceOverflow)?;
                        txn.set_goal_saved(goal_id, saved)?;
                        Some(saved)
                    }
                    None => None,
                };

                txn.set_balance(account.account_id, account_after)?;
                txn.set_safebox_balance(&owner, safebox_after)?;
                txn.record_history(NewHistoryEntry {
                    account_id: account.account_id,
                    direction: Direction::Out,
                    amount,
                    memo: SAFEBOX_DEPOSIT_MEMO.to_string(),
                    transfer_id: None,
                    counterparty_account_id: None,
                })?;
                Ok(Allocation {
                    account_balance: account_after,
                    safebox_balance: safebox_after,
                    goal_saved,
                })
            })
            .await?;

        info!(
            amount,
            goal_id,
            safebox_balance = allocation.safebox_balance,
            "Safebox allocation completed"
        );
        Ok(allocation)
    }

    pub async fn create_goal(&self, owner: &PseudonymizedId, request: GoalRequest) -> Result<SavingGoal, SafeboxError> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(SafeboxError::InvalidTitle);
        }
        if request.target_amount <= 0 {
            return Err(SafeboxError::InvalidAmount);
        }
        if request.start_date > request.end_date {
            return Err(SafeboxError::InvalidPeriod);
        }

        let owner = owner.clone();
        self.ledger
            .write(move |txn| {
                let safebox = txn.safebox(&owner)?.ok_or(SafeboxError::NoSafebox)?;
                Ok(txn.insert_goal(NewSavingGoal {
                    safebox_id: safebox.safebox_id,
                    title,
                    target_amount: request.target_amount,
                    start_date: request.start_date,
                    end_date: request.end_date,
                    cadence: request.cadence,
                })?)
            })
            .await
    }

    /// One goal of the owner's safebox with its saved total.
    pub async fn goal(&self, owner: &PseudonymizedId, goal_id: u64) -> Result<GoalDetail, SafeboxError> {
        let owner = owner.clone();
        self.ledger
            .read(move |v| {
                let safebox = v.safebox(&owner)?.ok_or(SafeboxError::NoSafebox)?;
                let goal = v
                    .goal(goal_id)?
                    .filter(|g| g.safebox_id == safebox.safebox_id)
                    .ok_or(SafeboxError::NoSuchGoal)?;
                Ok(GoalDetail {
                    goal,
                    safebox_balance: safebox.balance,
                })
            })
            .await
    }

    pub async fn overview(&self, owner: &PseudonymizedId) -> Result<SafeboxOverview, SafeboxError> {
        let owner = owner.clone();
        self.ledger
            .read(move |v| {
                let account = v.account_by_owner(&owner)?.ok_or(SafeboxError::NoSuchAccount)?;
                let (safebox_balance, goals) = match v.safebox(&owner)? {
                    Some(sb) => (Some(sb.balance), v.goals(sb.safebox_id)?),
                    None => (None, Vec::new()),
                };
                Ok(SafeboxOverview {
                    account_balance: account.balance,
                    safebox_balance,
                    goals,
                    total_assets: account.balance.saturating_add(safebox_balance.unwrap_or(0)),
                })
            })
            .await
    }
}
