//! Symmetric Encryption Service
//!
//! Every operation derives a fresh AES-256 key from the persisted secret with
//! PBKDF2-HMAC-SHA256 and a random salt, then encrypts with AES-256-CBC and
//! PKCS#7 padding. Records are hex text:
//!
//! ```text
//! hex(salt: 32 bytes) ‖ hex(iv: 16 bytes) ‖ hex(ciphertext)
//! ```
//!
//! CBC without a MAC gives confidentiality only. A wrong key is usually caught
//! by the padding check but not always.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

pub mod file_encryption;
pub mod key_management;

pub use self::{
    file_encryption::EncryptedFile,
    key_management::{EncryptionKey, KeyStore},
};

use crate::utils::crypto_utils::{self, IV_SIZE};

pub const SALT_SIZE: usize = 32;
pub const TOKEN_SIZE: usize = 32;

const SALT_HEX_LEN: usize = SALT_SIZE * 2;
const IV_HEX_LEN: usize = IV_SIZE * 2;

/// Custom error type for encryption operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EncryptionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A record that cannot be turned back into plaintext. No partial output is
/// ever returned alongside one of these.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecryptionError {
    #[error("record is {0} characters, shorter than salt and IV")]
    Truncated(usize),

    #[error("record is not valid hex")]
    InvalidHex,

    #[error("ciphertext of {0} bytes is not a whole number of blocks")]
    Length(usize),

    #[error("bad padding (wrong key or corrupted record)")]
    Padding,

    #[error("plaintext is not valid UTF-8")]
    Utf8,

    #[error("payload is not valid base64")]
    Base64,

    #[error("file name does not end with .{0}")]
    Suffix(String),
}

/// Result type alias for encryption operations
pub type Result<T> = std::result::Result<T, EncryptionError>;

/// Encrypts and decrypts payloads with the current key of a [`KeyStore`].
#[derive(Debug, Clone)]
pub struct EncryptionService {
    keys: Arc<KeyStore>,
    encrypted_suffix: String,
}

impl EncryptionService {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            encrypted_suffix: file_encryption::DEFAULT_SUFFIX.to_string(),
        }
    }

    /// Uses `suffix` (without the dot) for encrypted file names.
    pub fn with_encrypted_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.encrypted_suffix = suffix.into();
        self
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn encrypted_suffix(&self) -> &str {
        &self.encrypted_suffix
    }

    #[instrument(skip_all, fields(len = data.len()))]
    pub fn encrypt_data(&self, data: &[u8]) -> Result<String> {
        let key = self.keys.read();
        let salt = crypto_utils::random_bytes::<SALT_SIZE>();
        let iv = crypto_utils::random_bytes::<IV_SIZE>();

        let derived = crypto_utils::derive_key(key.as_bytes(), &salt)?;
        let ciphertext = crypto_utils::encrypt_aes_cbc(data, &derived, &iv)?;

        let mut record = String::with_capacity(SALT_HEX_LEN + IV_HEX_LEN + ciphertext.len() * 2);
        record.push_str(&hex::encode(salt));
        record.push_str(&hex::encode(iv));
        record.push_str(&hex::encode(&ciphertext));
        debug!(record_len = record.len(), "encrypted payload");
        Ok(record)
    }

    #[instrument(skip_all, fields(record_len = record.len()))]
    pub fn decrypt_data(&self, record: &str) -> Result<Vec<u8>> {
        let record = record.trim();
        if record.len() < SALT_HEX_LEN + IV_HEX_LEN || !record.is_char_boundary(SALT_HEX_LEN + IV_HEX_LEN) {
            return Err(DecryptionError::Truncated(record.len()).into());
        }
        let (salt_hex, rest) = record.split_at(SALT_HEX_LEN);
        let (iv_hex, ct_hex) = rest.split_at(IV_HEX_LEN);

        let salt = hex::decode(salt_hex).map_err(|_| DecryptionError::InvalidHex)?;
        let iv = hex::decode(iv_hex).map_err(|_| DecryptionError::InvalidHex)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| DecryptionError::InvalidHex)?;

        let key = self.keys.read();
        let derived = crypto_utils::derive_key(key.as_bytes(), &salt)?;
        crypto_utils::decrypt_aes_cbc(&ciphertext, &derived, &iv)
    }

    pub fn encrypt_string(&self, text: &str) -> Result<String> {
        self.encrypt_data(text.as_bytes())
    }

    pub fn decrypt_string(&self, record: &str) -> Result<String> {
        let bytes = self.decrypt_data(record)?;
        String::from_utf8(bytes).map_err(|_| DecryptionError::Utf8.into())
    }

    /// Serializes `value` to JSON and encrypts it.
    pub fn encrypt_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = serde_json::to_vec(value)?;
        self.encrypt_data(&json)
    }

    pub fn decrypt_json<T: DeserializeOwned>(&self, record: &str) -> Result<T> {
        let bytes = self.decrypt_data(record)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 32 random bytes as 64 hex characters. Independent of the key.
    pub fn generate_secure_token(&self) -> String {
        hex::encode(crypto_utils::random_bytes::<TOKEN_SIZE>())
    }
}
