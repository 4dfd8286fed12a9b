//! XChaCha20-Poly1305 cipher block keyed from a shared secret.

use std::fmt;

use blake2::{Blake2s256, Digest};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::core::{
    CIPHER_KEY_SIZE, CIPHER_NONCE_SIZE, CIPHER_OVERHEAD, CIPHER_TAG_SIZE, CryptoError,
};

/// Algorithm names accepted in a [`CryptConfig`].
pub const SUPPORTED_ALGORITHMS: &[&str] = &["xchacha20", "xchacha20-poly1305"];

/// Cipher settings of a network or a point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptConfig {
    /// Cipher algorithm name.
    #[serde(rename = "algo")]
    pub algorithm: String,
    /// Shared secret. Empty disables the cipher.
    pub secret: String,
}

impl Default for CryptConfig {
    fn default() -> Self {
        Self {
            algorithm: SUPPORTED_ALGORITHMS[0].to_string(),
            secret: String::new(),
        }
    }
}

impl CryptConfig {
    /// Create settings for the default algorithm.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Whether these settings enable a cipher at all.
    pub fn is_enabled(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Build the cipher block, or `None` when no secret is configured.
    pub fn block(&self) -> Result<Option<CipherBlock>, CryptoError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let algorithm = self.algorithm.to_ascii_lowercase();
        if !algorithm.is_empty() && !SUPPORTED_ALGORITHMS.contains(&algorithm.as_str()) {
            return Err(CryptoError::UnsupportedAlgorithm(self.algorithm.clone()));
        }
        CipherBlock::from_secret(&self.secret).map(Some)
    }
}

/// Symmetric cipher block applied to every frame body.
///
/// The key is zeroized on drop.
#[derive(Clone)]
pub struct CipherBlock {
    key: [u8; CIPHER_KEY_SIZE],
}

impl CipherBlock {
    /// Derive a block from a shared secret (BLAKE2s-256 of the secret).
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }
        let digest = Blake2s256::digest(secret.as_bytes());
        let mut key = [0u8; CIPHER_KEY_SIZE];
        key.copy_from_slice(&digest);
        Ok(Self { key })
    }

    /// Create a block from raw key material.
    pub fn from_key(key: [u8; CIPHER_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Bytes added to every sealed body.
    pub fn overhead(&self) -> usize {
        CIPHER_OVERHEAD
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    ///
    /// Returns `nonce || ciphertext || tag`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; CIPHER_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(CIPHER_NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Authenticate and decrypt a body produced by [`seal`](Self::seal).
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < CIPHER_NONCE_SIZE + CIPHER_TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let (nonce, ciphertext) = sealed.split_at(CIPHER_NONCE_SIZE);

        let cipher = XChaCha20Poly1305::new((&self.key).into());
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl fmt::Debug for CipherBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherBlock").finish_non_exhaustive()
    }
}

impl Drop for CipherBlock {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
