// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Banking service endpoints.
//!
//! Every route except health and the API docs requires a verified token.
//! The account owner is always the caller's pseudonymized id; no request
//! body can name another owner.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use super::health;
use crate::auth::{enforce_access_policy, local_authenticate, AccessPolicy, Auth};
use crate::banking::{
    AccountError, GoalRequest, SafeboxError, TransferError, TransferRequest, DEFAULT_HISTORY_LIMIT,
};
use crate::error::ApiError;
use crate::models::{
    AccountResponse, CheckAccountRequest, CheckAccountResponse, CreateAccountRequest,
    CreateAccountResponse, CreateGoalRequest, GoalDetailResponse, GoalResponse, HealthResponse,
    HistoryEntryResponse,
    HistoryResponse, OperationResult, SafeboxAllocateRequest, SafeboxAllocateResponse,
    SafeboxResponse, SendVerificationRequest, TransferRequestBody, TransferResponse,
    VerifyEmailRequest,
};
use crate::state::BankingState;
use crate::storage::{Cadence, Direction};

const PUBLIC_PATHS: &[&str] = &["/health", "/api/health"];
const PUBLIC_PREFIXES: &[&str] = &["/docs", "/api-doc"];

pub const BANKING_POLICY: AccessPolicy = AccessPolicy::new(PUBLIC_PATHS, PUBLIC_PREFIXES);

const MAX_HISTORY_LIMIT: usize = 200;

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::NoSuchAccount => ApiError::not_found("No account exists for this user"),
            AccountError::Ledger(e) => e.into(),
            other => ApiError::internal(&other),
        }
    }
}

impl From<SafeboxError> for ApiError {
    fn from(e: SafeboxError) -> Self {
        match e {
            SafeboxError::Ledger(e) => e.into(),
            SafeboxError::NoSuchAccount => ApiError::not_found("No account exists for this user"),
            SafeboxError::NoSafebox => ApiError::not_found("No safebox exists for this user"),
            SafeboxError::NoSuchGoal => ApiError::not_found("Saving goal not found"),
            SafeboxError::InvalidAmount => ApiError::bad_request("Amount must be greater than zero"),
            SafeboxError::InsufficientFunds => ApiError::bad_request("Insufficient balance"),
            SafeboxError::InvalidPeriod => ApiError::bad_request("Start date must not be after end date"),
            SafeboxError::InvalidTitle => ApiError::bad_request("Goal title must not be empty"),
        }
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Send a 6-digit verification code to an email address.
#[utoipa::path(
    post,
    path = "/api/account/send-verification",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    request_body = SendVerificationRequest,
    responses(
        (status = 200, description = "Code issued", body = OperationResult),
        (status = 400, description = "Invalid email address", body = OperationResult),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn send_verification(
    Auth(user): Auth,
    State(state): State<BankingState>,
    Json(request): Json<SendVerificationRequest>,
) -> Result<Response, ApiError> {
    match state.accounts.send_verification(&request.email) {
        Ok(()) => Ok(Json(OperationResult::ok("Verification code sent")).into_response()),
        Err(AccountError::InvalidEmail) => Ok((
            StatusCode::BAD_REQUEST,
            Json(OperationResult::failed("Enter a valid email address.")),
        )
            .into_response()),
        Err(e) => {
            warn!(subject_id = user.subject_id, error = %e, "Verification code not sent");
            Err(ApiError::internal(&e))
        }
    }
}

/// Check a verification code without consuming it.
#[utoipa::path(
    post,
    path = "/api/account/verify-email",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Verification result", body = OperationResult),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn verify_email(
    Auth(_user): Auth,
    State(state): State<BankingState>,
    Json(request): Json<VerifyEmailRequest>,
) -> Json<OperationResult> {
    if state.accounts.verify_email(&request.email, &request.code) {
        Json(OperationResult::ok("Verification code confirmed."))
    } else {
        Json(OperationResult::failed("The verification code is incorrect."))
    }
}

/// Open the caller's account.
#[utoipa::path(
    post,
    path = "/api/account/create",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    request_body = CreateAccountRequest,
    responses(
        (status = 200, description = "Outcome of the opening attempt", body = CreateAccountResponse),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Ledger busy")
    )
)]
pub async fn create_account(
    Auth(user): Auth,
    State(state): State<BankingState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<Json<CreateAccountResponse>, ApiError> {
    let refused = |message: &str| {
        Json(CreateAccountResponse {
            success: false,
            message: message.to_string(),
            account_number: None,
        })
    };

    match state
        .accounts
        .open_account(&user, &request.email, &request.code, &request.password)
        .await
    {
        Ok(opened) => Ok(Json(CreateAccountResponse {
            success: true,
            message: "Account created".to_string(),
            account_number: Some(opened.account_number),
        })),
        Err(AccountError::CodeMismatch) => Ok(refused("The verification code is incorrect or expired.")),
        Err(AccountError::InvalidPassword) => Ok(refused("A transfer password is required.")),
        Err(AccountError::AccountAlreadyExists) => Ok(refused("An account already exists for this user.")),
        Err(e) => Err(e.into()),
    }
}

/// The caller's account.
#[utoipa::path(
    get,
    path = "/api/account",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Account details", body = AccountResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No account yet")
    )
)]
pub async fn get_account(
    Auth(user): Auth,
    State(state): State<BankingState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let summary = state
        .accounts
        .summary(&user.pseudonymized_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No account exists for this user"))?;

    Ok(Json(AccountResponse {
        account_number: summary.account_number,
        balance: summary.balance,
        owner_name: summary.owner_name,
        created_at: summary.created_at,
    }))
}

/// Resolve a recipient account number before a transfer.
#[utoipa::path(
    post,
    path = "/api/check-account",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    request_body = CheckAccountRequest,
    responses(
        (status = 200, description = "Lookup result", body = CheckAccountResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn check_account(
    Auth(_user): Auth,
    State(state): State<BankingState>,
    Json(request): Json<CheckAccountRequest>,
) -> Result<Json<CheckAccountResponse>, ApiError> {
    let found = state.accounts.lookup_recipient(&request.account_number).await?;
    Ok(Json(match found {
        Some(recipient) => CheckAccountResponse {
            success: true,
            owner_name: Some(recipient.owner_name),
            account_number: Some(recipient.account_number),
            message: None,
        },
        None => CheckAccountResponse {
            success: false,
            owner_name: None,
            account_number: None,
            message: Some("The account does not exist.".to_string()),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Movements of the caller's account, newest first.
#[utoipa::path(
    get,
    path = "/api/history",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    params(
        ("limit" = Option<usize>, Query, description = "Maximum entries (default 50)")
    ),
    responses(
        (status = 200, description = "History entries", body = HistoryResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No account yet")
    )
)]
pub async fn history(
    Auth(user): Auth,
    State(state): State<BankingState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let items = state.accounts.history(&user.pseudonymized_id, limit).await?;

    let entries: Vec<HistoryEntryResponse> = items
        .into_iter()
        .map(|item| HistoryEntryResponse {
            direction: item.direction,
            amount: item.amount,
            memo: item.memo,
            timestamp: item.timestamp,
            counterparty_name: item.counterparty_name,
            counterparty_account_number: item.counterparty_number,
        })
        .collect();
    let total = entries.len();
    Ok(Json(HistoryResponse { entries, total }))
}

// =============================================================================
// Transfers
// =============================================================================

/// Move money from the caller's account to another account.
///
/// Business-rule failures come back as `200` with `success: false`.
#[utoipa::path(
    post,
    path = "/api/transfer",
    tag = "Transfers",
    security(("bearer_auth" = [])),
    request_body = TransferRequestBody,
    responses(
        (status = 200, description = "Transfer outcome", body = TransferResponse),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Ledger busy")
    )
)]
pub async fn transfer(
    Auth(user): Auth,
    State(state): State<BankingState>,
    Json(body): Json<TransferRequestBody>,
) -> Result<Json<TransferResponse>, ApiError> {
    let memo = body.memo.unwrap_or_default();
    let request = TransferRequest {
        from_owner: user.pseudonymized_id.clone(),
        to_account_number: body.to_account_number,
        amount: body.amount,
        memo,
        password: body.password,
    };

    match state.transfers.transfer(request).await {
        Ok(receipt) => Ok(Json(TransferResponse {
            success: true,
            message: "Transfer completed".to_string(),
            transfer_id: Some(receipt.record.transfer_id),
            recipient_name: Some(receipt.recipient_name),
            to_account_number: Some(receipt.to_account_number),
            amount: Some(receipt.record.amount),
            memo: Some(receipt.record.memo),
            balance: Some(receipt.from_balance_after),
        })),
        Err(e) if e.is_business_failure() => {
            info!(subject_id = user.subject_id, reason = %e, "Transfer refused");
            Ok(Json(TransferResponse::failed(e.user_message())))
        }
        Err(TransferError::Ledger(e)) => Err(e.into()),
        Err(e) => Err(ApiError::internal(&e)),
    }
}

// =============================================================================
// Safebox
// =============================================================================

/// Move money from the caller's account into their safebox.
///
/// Business-rule failures come back as `200` with `success: false`.
#[utoipa::path(
    post,
    path = "/api/safebox/allocate",
    tag = "Safebox",
    security(("bearer_auth" = [])),
    request_body = SafeboxAllocateRequest,
    responses(
        (status = 200, description = "Allocation outcome", body = SafeboxAllocateResponse),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Ledger busy")
    )
)]
pub async fn allocate_safebox(
    Auth(user): Auth,
    State(state): State<BankingState>,
    Json(request): Json<SafeboxAllocateRequest>,
) -> Result<Json<SafeboxAllocateResponse>, ApiError> {
    match state
        .safebox
        .allocate(&user.pseudonymized_id, request.amount, request.goal_id)
        .await
    {
        Ok(allocation) => Ok(Json(SafeboxAllocateResponse {
            success: true,
            message: "Safebox amount allocated".to_string(),
            account_balance: Some(allocation.account_balance),
            safebox_balance: Some(allocation.safebox_balance),
            goal_saved_amount: allocation.goal_saved,
        })),
        Err(e) if e.is_business_failure() => {
            info!(subject_id = user.subject_id, reason = %e, "Safebox allocation refused");
            Ok(Json(SafeboxAllocateResponse::failed(e.user_message())))
        }
        Err(e) => Err(e.into()),
    }
}

/// Add a saving goal to the caller's safebox.
#[utoipa::path(
    post,
    path = "/api/safebox/goal",
    tag = "Safebox",
    security(("bearer_auth" = [])),
    request_body = CreateGoalRequest,
    responses(
        (status = 201, description = "Goal created", body = GoalResponse),
        (status = 400, description = "Invalid goal"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No safebox yet")
    )
)]
pub async fn create_goal(
    Auth(user): Auth,
    State(state): State<BankingState>,
    Json(request): Json<CreateGoalRequest>,
) -> Result<(StatusCode, Json<GoalResponse>), ApiError> {
    let goal = state
        .safebox
        .create_goal(
            &user.pseudonymized_id,
            GoalRequest {
                title: request.title,
                target_amount: request.target_amount,
                start_date: request.start_date,
                end_date: request.end_date,
                cadence: request.cadence,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(goal.into())))
}

/// One saving goal of the caller's safebox with its saved total.
#[utoipa::path(
    get,
    path = "/api/safebox/goal/{goal_id}",
    tag = "Safebox",
    security(("bearer_auth" = [])),
    params(
        ("goal_id" = u64, Path, description = "Saving goal id")
    ),
    responses(
        (status = 200, description = "Goal and progress", body = GoalDetailResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No safebox or no such goal")
    )
)]
pub async fn get_goal(
    Auth(user): Auth,
    State(state): State<BankingState>,
    Path(goal_id): Path<u64>,
) -> Result<Json<GoalDetailResponse>, ApiError> {
    let detail = state.safebox.goal(&user.pseudonymized_id, goal_id).await?;
    let remaining_amount = detail.remaining_amount();
    let progress_percent = detail.progress_percent();
    Ok(Json(GoalDetailResponse {
        total_saved: detail.goal.saved_amount,
        remaining_amount,
        progress_percent,
        safebox_balance: detail.safebox_balance,
        goal: detail.goal.into(),
    }))
}

/// Safebox balance, goals and total assets.
#[utoipa::path(
    get,
    path = "/api/safebox",
    tag = "Safebox",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Safebox overview", body = SafeboxResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No account yet")
    )
)]
pub async fn get_safebox(
    Auth(user): Auth,
    State(state): State<BankingState>,
) -> Result<Json<SafeboxResponse>, ApiError> {
    let overview = state.safebox.overview(&user.pseudonymized_id).await?;
    Ok(Json(SafeboxResponse {
        account_balance: overview.account_balance,
        safebox_balance: overview.safebox_balance,
        total_assets: overview.total_assets,
        goals: overview.goals.into_iter().map(GoalResponse::from).collect(),
    }))
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: BankingState) -> Router {
    let tokens = state.tokens.clone();
    let routes = Router::new()
        .route("/health", get(health::banking_health))
        .route("/api/health", get(health::banking_health))
        .route("/api/account", get(get_account))
        .route("/api/account/send-verification", post(send_verification))
        .route("/api/account/verify-email", post(verify_email))
        .route("/api/account/create", post(create_account))
        .route("/api/check-account", post(check_account))
        .route("/api/history", get(history))
        .route("/api/transfer", post(transfer))
        .route("/api/safebox", get(get_safebox))
        .route("/api/safebox/allocate", post(allocate_safebox))
        .route("/api/safebox/goal", post(create_goal))
        .route("/api/safebox/goal/{goal_id}", get(get_goal))
        .with_state(state);

    routes
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(from_fn_with_state(BANKING_POLICY, enforce_access_policy))
        .layer(from_fn_with_state(tokens, local_authenticate))
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::banking_health,
        send_verification,
        verify_email,
        create_account,
        get_account,
        check_account,
        history,
        transfer,
        allocate_safebox,
        create_goal,
        get_goal,
        get_safebox
    ),
    components(
        schemas(
            HealthResponse,
            OperationResult,
            SendVerificationRequest,
            VerifyEmailRequest,
            CreateAccountRequest,
            CreateAccountResponse,
            AccountResponse,
            CheckAccountRequest,
            CheckAccountResponse,
            HistoryEntryResponse,
            HistoryResponse,
            TransferRequestBody,
            TransferResponse,
            SafeboxAllocateRequest,
            SafeboxAllocateResponse,
            CreateGoalRequest,
            GoalResponse,
            GoalDetailResponse,
            SafeboxResponse,
            Direction,
            Cadence
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Accounts", description = "Account opening and queries"),
        (name = "Transfers", description = "Money transfers between accounts"),
        (name = "Safebox", description = "Savings safebox and goals")
    )
)]
pub struct ApiDoc;
