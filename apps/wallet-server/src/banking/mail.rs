// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound mail seam for email verification codes.
//!
//! Actual delivery (SMTP or a provider API) is deployment-specific. The
//! default [`LogMailer`] only records that a code was issued, with the
//! address masked and the code withheld.

use tracing::info;

use crate::crypto::mask_email;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

pub trait MailSender: Send + Sync {
    fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailError>;
}

/// Mailer that delivers nothing and logs the masked recipient.
#[derive(Debug, Default)]
pub struct LogMailer;

impl MailSender for LogMailer {
    fn send_verification_code(&self, to: &str, _code: &str) -> Result<(), MailError> {
        info!(to = %mask_email(to), "Verification code issued (no mail transport configured)");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures codes so tests can complete the verification flow.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMailer {
        pub fn last_code_for(&self, to: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(addr, _)| addr == to)
                .map(|(_, code)| code.clone())
        }
    }

    impl MailSender for RecordingMailer {
        fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailError> {
            self.sent.lock().unwrap().push((to.to_string(), code.to_string()));
            Ok(())
        }
    }
}
