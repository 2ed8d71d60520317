// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Server-side encryption providers.
//!
//! SSE-S3 derives a per-content data key from an engine master key via
//! HKDF-SHA256 and encrypts with AES-256-GCM under a random nonce. SSE-C
//! uses the customer-supplied 256-bit key directly; the engine keeps only
//! the base64 MD5 fingerprint of that key for verification on reads.
//! GCM authentication makes a wrong-key read fail rather than return
//! garbage bytes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use bytes::Bytes;
use cask_core::types::ContentId;
use hkdf::Hkdf;
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

/// AES-256-GCM nonce size (96 bits).
const NONCE_SIZE: usize = 12;

/// AES-256 key size (256 bits).
pub const KEY_SIZE: usize = 32;

/// Encryption errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Stored nonce has the wrong length.
    #[error("invalid nonce: must be exactly 12 bytes")]
    InvalidNonce,

    /// Master key is not exactly 32 bytes.
    #[error("invalid master key: must be exactly 32 bytes")]
    InvalidMasterKey,

    /// Customer key is not exactly 32 bytes.
    #[error("invalid customer key: must be exactly 32 bytes")]
    InvalidCustomerKey,

    /// Decryption failed: wrong key or tampered ciphertext.
    #[error("access denied: wrong encryption key")]
    WrongKey,
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// A customer-provided SSE-C key.
///
/// Zeroed from memory on drop; never serialized or logged.
pub struct SseCKey {
    key: [u8; KEY_SIZE],
}

impl SseCKey {
    /// Wraps a raw 256-bit key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not exactly 32 bytes.
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidCustomerKey);
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(key);
        Ok(Self { key: arr })
    }

    /// Decodes a base64-encoded key as supplied on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not valid base64 for a 32-byte key.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidCustomerKey)?;
        Self::new(&bytes)
    }

    /// Returns the base64-encoded MD5 fingerprint of this key.
    ///
    /// This is the only derivative of the key the engine retains.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Md5::digest(self.key);
        base64::engine::general_purpose::STANDARD.encode(digest)
    }
}

impl std::fmt::Debug for SseCKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SseCKey(..)")
    }
}

impl Drop for SseCKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> CryptoResult<(Bytes, Vec<u8>)> {
    let nonce_bytes = generate_nonce();
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok((Bytes::from(ciphertext), nonce_bytes.to_vec()))
}

fn open(key: &[u8; KEY_SIZE], ciphertext: &[u8], nonce: &[u8]) -> CryptoResult<Bytes> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonce);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::WrongKey)?;
    let plaintext =
        cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| CryptoError::WrongKey)?;
    Ok(Bytes::from(plaintext))
}

/// SSE-S3 provider: engine-managed master key with per-content DEKs.
#[derive(Clone)]
pub struct SseS3Provider {
    master_key: [u8; KEY_SIZE],
}

impl Drop for SseS3Provider {
    fn drop(&mut self) {
        self.master_key.zeroize();
    }
}

impl SseS3Provider {
    /// Creates a provider from a 32-byte master key.
    ///
    /// # Errors
    ///
    /// Returns an error if the master key is not exactly 32 bytes.
    pub fn new(master_key: &[u8]) -> CryptoResult<Self> {
        if master_key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidMasterKey);
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(master_key);
        Ok(Self { master_key: key })
    }

    /// Creates a provider from a hex-encoded master key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a 64-character hex string.
    pub fn from_hex(hex_key: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(hex_key).map_err(|_| CryptoError::InvalidMasterKey)?;
        Self::new(&bytes)
    }

    /// Creates a provider with a freshly generated random master key.
    #[must_use]
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self { master_key: key }
    }

    /// Derives the data key for one content entry.
    ///
    /// HKDF-SHA256 keyed by the master key with the content id as info,
    /// so every entry is sealed under its own key.
    fn derive_key(&self, content_id: ContentId) -> CryptoResult<[u8; KEY_SIZE]> {
        let hk = Hkdf::<Sha256>::new(None, &self.master_key);
        let mut okm = [0u8; KEY_SIZE];
        hk.expand(content_id.as_bytes(), &mut okm)
            .map_err(|_| CryptoError::EncryptionFailed("HKDF expand failed".to_string()))?;
        Ok(okm)
    }

    /// Encrypts content; returns (ciphertext, nonce).
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, content_id: ContentId, plaintext: &[u8]) -> CryptoResult<(Bytes, Vec<u8>)> {
        let dek = self.derive_key(content_id)?;
        seal(&dek, plaintext)
    }

    /// Decrypts content sealed by [`Self::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns an error on wrong key material or tampered ciphertext.
    pub fn decrypt(
        &self,
        content_id: ContentId,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> CryptoResult<Bytes> {
        let dek = self.derive_key(content_id)?;
        open(&dek, ciphertext, nonce)
    }
}

/// SSE-C provider: the customer key is used directly, no derivation.
pub struct SseCProvider<'a> {
    key: &'a SseCKey,
}

impl<'a> SseCProvider<'a> {
    /// Creates a provider borrowing the customer key.
    #[must_use]
    pub fn new(key: &'a SseCKey) -> Self {
        Self { key }
    }

    /// Encrypts content; returns (ciphertext, nonce).
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<(Bytes, Vec<u8>)> {
        seal(&self.key.key, plaintext)
    }

    /// Decrypts content sealed by [`Self::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `WrongKey` on a mismatched key or tampered ciphertext.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> CryptoResult<Bytes> {
        open(&self.key.key, ciphertext, nonce)
    }
}
