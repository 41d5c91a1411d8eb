//! Salted hash utilities
//!
//! One-way verification values, independent of the encryption key. A record
//! is `hex(salt):hex(sha256(salt ‖ data))` with a 16-byte random salt.

use crate::utils::crypto_utils::{random_bytes, secure_compare, sha256_hash};

pub const HASH_SALT_SIZE: usize = 16;

/// Hashes `data` with a fresh random salt.
pub fn hash_data(data: &[u8]) -> String {
    let salt = random_bytes::<HASH_SALT_SIZE>();
    let digest = sha256_hash(&[&salt[..], data]);
    format!("{}:{}", hex::encode(salt), hex::encode(digest))
}

/// Recomputes the digest for `data` with the record's salt and compares in
/// constant time. Malformed records verify as `false`.
pub fn verify_hash(data: &[u8], record: &str) -> bool {
    let Some((salt_hex, digest_hex)) = record.trim().split_once(':') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    if salt.len() != HASH_SALT_SIZE {
        return false;
    }
    secure_compare(&sha256_hash(&[&salt[..], data]), &expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        let record = hash_data(b"integrity");
        let (salt, digest) = record.split_once(':').unwrap();
        assert_eq!(salt.len(), 32);
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_verify_correct_hash() {
        let record = hash_data(b"integrity");
        assert!(verify_hash(b"integrity", &record));
    }

    #[test]
    fn test_verify_incorrect_hash() {
        let record = hash_data(b"integrity");
        assert!(!verify_hash(b"tampered", &record));
    }

    #[test]
    fn test_salts_differ_per_call() {
        assert_ne!(hash_data(b"same"), hash_data(b"same"));
    }

    #[test]
    fn test_malformed_records_are_false() {
        for record in ["", "no-colon", "zz:00", "00:00", "abcd:abcd"] {
            assert!(!verify_hash(b"x", record));
        }
    }
}
