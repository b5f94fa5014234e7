// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deterministic reversible encryption for searchable fields.
//!
//! ## Scheme
//!
//! AES-256-GCM with a synthetic nonce:
//!
//! ```text
//! nonce      = HMAC-SHA256(nonce_key, plaintext)[..12]
//! sealed     = AES-256-GCM(enc_key, nonce, plaintext)
//! ciphertext = base64(nonce || sealed)
//! ```
//!
//! Equal plaintexts always produce equal ciphertexts, which lets the ledger
//! index accounts by encrypted number. The cost is a narrowed threat model:
//! anyone holding the store can see which rows share an account number,
//! though not the number itself.
//!
//! Both keys are derived from the configured secret, so the secret can be
//! any length.
//!
//! ## Encodings
//!
//! Output uses the standard base64 alphabet with padding. `decrypt` also
//! accepts the URL-safe alphabet, since values travel through query strings.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64ct::{Base64, Base64Url, Encoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

const ENC_KEY_LABEL: &[u8] = b"oww/field-cipher/enc/v1";
const NONCE_KEY_LABEL: &[u8] = b"oww/field-cipher/nonce/v1";

/// Placeholder shown in place of a field that failed to decrypt.
pub const UNAVAILABLE: &str = "unavailable";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("ciphertext is not valid base64 in either alphabet")]
    Encoding,

    #[error("ciphertext is too short")]
    Truncated,

    #[error("ciphertext failed authentication")]
    Authentication,

    #[error("decrypted field is not valid UTF-8")]
    Utf8,

    #[error("encryption failed")]
    Encrypt,
}

/// Keyed deterministic cipher for account numbers.
pub struct FieldCipher {
    aead: Aes256Gcm,
    nonce_key: [u8; 32],
}

impl FieldCipher {
    /// Build a cipher from an opaque configuration secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let enc_key = derive_key(secret, ENC_KEY_LABEL);
        let nonce_key = derive_key(secret, NONCE_KEY_LABEL);
        Self {
            aead: Aes256Gcm::new(&enc_key.into()),
            nonce_key,
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = self.synthetic_nonce(plaintext.as_bytes());
        let sealed = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(Base64::encode_string(&out))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let raw = Base64::decode_vec(ciphertext)
            .or_else(|_| Base64Url::decode_vec(ciphertext))
            .map_err(|_| CipherError::Encoding)?;

        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);

        let plain = self
            .aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Authentication)?;

        // A valid tag under a nonce we would never have chosen means the
        // value was not produced by this scheme.
        if self.synthetic_nonce(&plain) != nonce {
            return Err(CipherError::Authentication);
        }

        String::from_utf8(plain).map_err(|_| CipherError::Utf8)
    }

    /// Decrypt a stored field, falling back to [`UNAVAILABLE`].
    pub fn decrypt_or_unavailable(&self, ciphertext: &str, field: &'static str) -> String {
        match self.decrypt(ciphertext) {
            Ok(plain) => plain,
            Err(e) => {
                warn!(field, error = %e, "Stored field could not be decrypted");
                UNAVAILABLE.to_string()
            }
        }
    }

    fn synthetic_nonce(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let digest = hmac_sha256(&self.nonce_key, plaintext);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

fn derive_key(secret: &[u8], label: &[u8]) -> [u8; 32] {
    hmac_sha256(secret, label)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    if let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) {
        mac.update(data);
        out.copy_from_slice(&mac.finalize().into_bytes());
    }
    out
}
