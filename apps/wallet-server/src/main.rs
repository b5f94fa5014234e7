// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use oww_wallet_server::config::{ProcessEnv, ServerSettings};
use oww_wallet_server::{server, telemetry};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();

    let settings = match ServerSettings::load(&ProcessEnv) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid server configuration");
            return ExitCode::FAILURE;
        }
    };

    match server::run(settings, &ProcessEnv).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Service terminated");
            ExitCode::FAILURE
        }
    }
}
