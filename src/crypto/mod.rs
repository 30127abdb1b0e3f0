// ABOUTME: Machine-bound symmetric encryption for every secret the Hub persists
// ABOUTME: Derives one deployment key from the host identity and a random salt, then seals/opens with AES-256-GCM
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Crypto (C1)
//!
//! One symmetric key per deployment, derived once at startup and held only
//! in memory. Rotating `encryption_salt` invalidates every ciphertext
//! sealed under the old key — that is by design: the Hub does not attempt
//! online re-encryption, an operator who rotates the salt is expected to
//! re-onboard any credentials that were sealed under the old one.

pub mod machine_id;

use aes_gcm::aead::{generic_array::GenericArray, Aead};
use aes_gcm::{Aes256Gcm, KeyInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hub_core::errors::AppError;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

/// PBKDF2 iteration count. 400k is OWASP's current floor for
/// PBKDF2-HMAC-SHA256; re-derivation happens once per process start so the
/// cost is not on any request's hot path.
const KDF_ITERATIONS: u32 = 400_000;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// The deployment's single symmetric key, derived from the host identity
/// and a persisted random salt.
///
/// Holds the raw key bytes in memory only; [`Zeroize`] scrubs them on drop.
pub struct Crypto {
    key: [u8; KEY_LEN],
}

impl Crypto {
    /// Derive the deployment key from the machine identifier and the
    /// `SystemConfig.encryption_salt` persisted in the database.
    #[must_use]
    pub fn derive(salt: &[u8]) -> Self {
        let machine_id = machine_id::stable_machine_id();
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(machine_id.as_bytes(), salt, KDF_ITERATIONS, &mut key);
        Self { key }
    }

    /// Build directly from raw key bytes. Used by tests and by anything
    /// that already holds a derived key (e.g. a cached [`Crypto`] passed
    /// down from startup).
    #[must_use]
    pub const fn from_raw_key(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Generate a fresh random salt for a brand-new deployment.
    #[must_use]
    pub fn generate_salt() -> Vec<u8> {
        let mut salt = vec![0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    }

    /// Seal `plaintext` with a fresh random nonce, returning `nonce || ciphertext`.
    ///
    /// # Errors
    /// Returns [`AppError::Crypto`] if the underlying AEAD rejects the key
    /// (should not happen: the key is always exactly 32 bytes).
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, AppError> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| AppError::Crypto)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Seal a UTF-8 string and base64-encode the result, the shape every
    /// encrypted `ToolConfig`/`Credential` column is stored in.
    ///
    /// # Errors
    /// See [`Crypto::seal`].
    pub fn seal_to_base64(&self, plaintext: &str) -> Result<String, AppError> {
        Ok(BASE64.encode(self.seal(plaintext.as_bytes())?))
    }

    /// Open a `nonce || ciphertext` blob produced by [`Crypto::seal`].
    ///
    /// # Errors
    /// Returns [`AppError::Crypto`] if the blob is too short to contain a
    /// nonce, or if the authentication tag does not match (wrong key,
    /// corruption, or tampering).
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, AppError> {
        if sealed.len() < NONCE_LEN {
            return Err(AppError::Crypto);
        }
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = GenericArray::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::Crypto)
    }

    /// Inverse of [`Crypto::seal_to_base64`].
    ///
    /// # Errors
    /// Returns [`AppError::Crypto`] if the input is not valid base64 or if
    /// [`Crypto::open`] fails.
    pub fn open_from_base64(&self, sealed_base64: &str) -> Result<String, AppError> {
        let sealed = BASE64.decode(sealed_base64).map_err(|_| AppError::Crypto)?;
        let plaintext = self.open(&sealed)?;
        String::from_utf8(plaintext).map_err(|_| AppError::Crypto)
    }
}

impl Drop for Crypto {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrips() {
        let crypto = Crypto::from_raw_key([7u8; KEY_LEN]);
        let sealed = crypto.seal(b"top secret").expect("seal");
        let opened = crypto.open(&sealed).expect("open");
        assert_eq!(opened, b"top secret");
    }

    #[test]
    fn base64_roundtrips() {
        let crypto = Crypto::from_raw_key([3u8; KEY_LEN]);
        let sealed = crypto.seal_to_base64("a refresh token").expect("seal");
        let opened = crypto.open_from_base64(&sealed).expect("open");
        assert_eq!(opened, "a refresh token");
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let crypto = Crypto::from_raw_key([9u8; KEY_LEN]);
        let mut sealed = crypto.seal(b"payload").expect("seal");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(crypto.open(&sealed).is_err());
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let crypto_a = Crypto::from_raw_key([1u8; KEY_LEN]);
        let crypto_b = Crypto::from_raw_key([2u8; KEY_LEN]);
        let sealed = crypto_a.seal(b"payload").expect("seal");
        assert!(crypto_b.open(&sealed).is_err());
    }

    #[test]
    fn truncated_blob_fails_to_open() {
        let crypto = Crypto::from_raw_key([4u8; KEY_LEN]);
        assert!(crypto.open(&[0u8; 4]).is_err());
    }

    #[test]
    fn derive_is_deterministic_for_the_same_salt() {
        let salt = b"fixed-salt-for-test";
        let a = Crypto::derive(salt);
        let b = Crypto::derive(salt);
        let sealed_by_a = a.seal(b"hello").expect("seal");
        assert_eq!(b.open(&sealed_by_a).expect("open"), b"hello");
    }

    #[test]
    fn derive_differs_across_salts() {
        let a = Crypto::derive(b"salt-one");
        let b = Crypto::derive(b"salt-two");
        let sealed_by_a = a.seal(b"hello").expect("seal");
        assert!(b.open(&sealed_by_a).is_err());
    }
}
