// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted ledger and identity records.
//!
//! Stored as JSON values inside redb tables. Amounts are whole KRW in `i64`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;
use crate::crypto::PseudonymizedId;

// =============================================================================
// Ledger
// =============================================================================

/// Bank account. One per owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: u64,
    pub owner: PseudonymizedId,
    /// Display name at opening time, shown to senders.
    pub owner_name: String,
    /// Deterministic ciphertext of the account number.
    pub encrypted_number: String,
    /// Never negative.
    pub balance: i64,
    /// Argon2 PHC string. `None` means transfers can never be authorized.
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when opening an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub owner: PseudonymizedId,
    pub owner_name: String,
    pub encrypted_number: String,
    pub password_hash: Option<String>,
}

/// Savings box, created lazily on first allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Safebox {
    pub safebox_id: u64,
    pub owner: PseudonymizedId,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SavingGoal {
    pub goal_id: u64,
    pub safebox_id: u64,
    pub title: String,
    pub target_amount: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cadence: Cadence,
    /// Sum of allocations made toward this goal.
    #[serde(default)]
    pub saved_amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSavingGoal {
    pub safebox_id: u64,
    pub title: String,
    pub target_amount: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cadence: Cadence,
}

/// Append-only record of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: u64,
    pub from_account_id: u64,
    pub to_account_id: u64,
    pub amount: i64,
    pub memo: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Out,
    In,
}

/// One leg of a money movement as seen from one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entry_id: u64,
    pub account_id: u64,
    pub direction: Direction,
    pub amount: i64,
    pub memo: String,
    pub timestamp: DateTime<Utc>,
    /// Set for transfer legs, `None` for safebox deposits.
    pub transfer_id: Option<u64>,
    pub counterparty_account_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub account_id: u64,
    pub direction: Direction,
    pub amount: i64,
    pub memo: String,
    pub transfer_id: Option<u64>,
    pub counterparty_account_id: Option<u64>,
}

// =============================================================================
// Identity
// =============================================================================

/// Login provider that created an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub fn from_key(key: &str) -> Option<Provider> {
        match key.to_ascii_lowercase().as_str() {
            "google" => Some(Provider::Google),
            "github" => Some(Provider::Github),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }
}

/// Social-login identity. The raw email is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Assigned once from a counter, never reused.
    pub subject_id: u64,
    pub pseudonymized_id: PseudonymizedId,
    pub display_name: String,
    pub role: Role,
    pub provider: Provider,
    pub provider_id: String,
    pub avatar_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
