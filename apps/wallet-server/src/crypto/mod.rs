// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Field-level Cryptography
//!
//! Three primitives protect personal and financial fields:
//!
//! - [`pseudonym`] - one-way keyed digest of emails, used as the join key
//!   between services. No decrypt exists.
//! - [`field_cipher`] - deterministic reversible encryption of account
//!   numbers so they can be looked up by exact ciphertext match.
//! - [`password`] - Argon2id verifier hashes for transfer passwords.

pub mod field_cipher;
pub mod password;
pub mod pseudonym;

pub use field_cipher::{CipherError, FieldCipher, UNAVAILABLE};
pub use password::{PasswordError, PasswordVerifier};
pub use pseudonym::{mask_email, PseudonymizedId, Pseudonymizer};
