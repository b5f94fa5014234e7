// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OWW Wallet - Social-login Wallet Services
//!
//! One crate, three HTTP services selected at startup:
//!
//! - **gateway**: verifies the token once at the edge and reverse-proxies
//!   to the other two services.
//! - **identity**: Google/GitHub login, token issuance and refresh, cookies.
//! - **banking**: accounts, transfers and the safebox on a redb ledger.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers and routers (Axum)
//! - `auth` - Token service, edge filter and per-service verification
//! - `banking` - Ledger engine, transfer orchestrator, accounts, safebox
//! - `crypto` - Pseudonymizer, field cipher, password verifier
//! - `identity` - Social login and the identity service
//! - `storage` - redb stores and TTL caches
//! - `server` - Service assembly and lifecycle

pub mod api;
pub mod auth;
pub mod banking;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod models;
pub mod server;
pub mod state;
pub mod storage;
pub mod telemetry;
