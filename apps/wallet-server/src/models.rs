// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the identity and banking services. All
//! types derive `Serialize`/`Deserialize` and `ToSchema`; JSON field names
//! are camelCase.
//!
//! ## Model Categories
//!
//! - **Common**: operation results and health responses
//! - **Identity**: current user
//! - **Accounts**: verification, opening, lookup and history
//! - **Transfers**: transfer request and outcome
//! - **Safebox**: allocation, saving goals and overview
//!
//! Account numbers only ever appear here in plaintext; storage holds the
//! encrypted form.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;
use crate::storage::{Cadence, Direction, Provider, SavingGoal};

// =============================================================================
// Common
// =============================================================================

/// Outcome of a business operation. Failures are reported here with a
/// user-facing message rather than through the status code.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Static liveness answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

// =============================================================================
// Identity
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_no: u64,
    pub username: String,
    pub role: Role,
    pub provider: Provider,
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    pub email: String,
    pub code: String,
    /// Transfer password. Stored only as an Argon2 hash.
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    /// Plaintext number, or `unavailable` if it could not be decrypted.
    pub account_number: String,
    pub balance: i64,
    pub owner_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckAccountRequest {
    pub account_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckAccountResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryResponse {
    pub direction: Direction,
    pub amount: i64,
    pub memo: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_account_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntryResponse>,
    pub total: usize,
}

// =============================================================================
// Transfers
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequestBody {
    pub to_account_number: String,
    /// Whole KRW.
    pub amount: i64,
    #[serde(default)]
    pub memo: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Sender's balance after the transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

impl TransferResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Safebox
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SafeboxAllocateRequest {
    pub amount: i64,
    /// Goal to credit with this allocation.
    #[serde(default)]
    pub goal_id: Option<u64>,
}

/// Business-rule failures come back with `success: false` and no balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SafeboxAllocateResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safebox_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_saved_amount: Option<i64>,
}

impl SafeboxAllocateResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGoalRequest {
    pub title: String,
    pub target_amount: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cadence: Cadence,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoalResponse {
    pub goal_id: u64,
    pub title: String,
    pub target_amount: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cadence: Cadence,
    pub saved_amount: i64,
    pub created_at: DateTime<Utc>,
}

impl From<SavingGoal> for GoalResponse {
    fn from(goal: SavingGoal) -> Self {
        Self {
            goal_id: goal.goal_id,
            title: goal.title,
            target_amount: goal.target_amount,
            start_date: goal.start_date,
            end_date: goal.end_date,
            cadence: goal.cadence,
            saved_amount: goal.saved_amount,
            created_at: goal.created_at,
        }
    }
}

/// One goal with its progress.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoalDetailResponse {
    pub goal: GoalResponse,
    pub total_saved: i64,
    pub remaining_amount: i64,
    pub progress_percent: u8,
    pub safebox_balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SafeboxResponse {
    pub account_balance: i64,
    /// Absent until the first allocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safebox_balance: Option<i64>,
    pub total_assets: i64,
    pub goals: Vec<GoalResponse>,
}
