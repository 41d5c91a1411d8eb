//! Cryptographic primitives shared by the encryption service and hash helpers

use aes::Aes256;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::encryption::{DecryptionError, EncryptionError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const PBKDF2_ITERATIONS: u32 = 10_000;
pub const KEY_SIZE: usize = 32;
pub const IV_SIZE: usize = 16;
pub const AES_BLOCK_SIZE: usize = 16;

/// Fills a fixed-size buffer from the OS random source.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Derives a 256-bit key from a password using PBKDF2-HMAC-SHA256
pub fn derive_key(password: &[u8], salt: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::<HmacSha256>(password, salt, PBKDF2_ITERATIONS, &mut key)
        .map_err(|e| EncryptionError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Encrypts data using AES-256-CBC with PKCS#7 padding
pub fn encrypt_aes_cbc(data: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| EncryptionError::KeyDerivation(e.to_string()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
}

/// Decrypts data using AES-256-CBC; bad padding is reported, never truncated
pub fn decrypt_aes_cbc(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(DecryptionError::Length(ciphertext.len()).into());
    }
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| EncryptionError::KeyDerivation(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DecryptionError::Padding.into())
}

/// Calculates SHA-256 over the concatenation of `parts`
pub fn sha256_hash(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Performs constant-time comparison to prevent timing attacks
pub fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).unwrap_u8() == 1
}
