//! Key Management
//!
//! One secret per process: the hex form of 32 random bytes, persisted to an
//! owner-only file. The store is constructed explicitly and shared through an
//! `Arc`; crypto operations hold the read lock for their whole duration and
//! rotation takes the write lock.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{info, instrument, warn};

use super::{EncryptionError, Result};
use crate::utils::crypto_utils::{self, KEY_SIZE};
use crate::utils::io;

/// The persisted secret. Used as the PBKDF2 password, never directly as an
/// AES key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    pub fn generate() -> Self {
        Self(hex::encode(crypto_utils::random_bytes::<KEY_SIZE>()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

pub struct KeyStore {
    path: PathBuf,
    key: RwLock<EncryptionKey>,
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Loads the key at `path`, or generates and persists one when the file
    /// does not exist. Surrounding whitespace in the file is ignored.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        io::ensure_parent_dir(&path)?;

        let key = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    return Err(EncryptionError::Key(format!(
                        "key file {} is empty",
                        path.display()
                    )));
                }
                EncryptionKey(trimmed.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let key = EncryptionKey::generate();
                io::write_atomic(&path, key.as_bytes())?;
                info!("generated new encryption key");
                key
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            key: RwLock::new(key),
        })
    }

    /// In-memory store that never touches disk. Rotation still persists, so
    /// it is only useful where rotation is not exercised.
    pub fn from_key(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: RwLock::new(EncryptionKey(key.into())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Holds the current key; rotation waits until the guard is dropped.
    pub fn read(&self) -> RwLockReadGuard<'_, EncryptionKey> {
        self.key.read()
    }

    /// Replaces the key on disk and in memory. Existing records are not
    /// re-encrypted and stop decrypting.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn rotate(&self) -> Result<()> {
        let mut current = self.key.write();
        let next = EncryptionKey::generate();
        io::write_atomic(&self.path, next.as_bytes())?;
        *current = next;
        warn!("encryption key rotated; records sealed with the previous key can no longer be decrypted");
        Ok(())
    }
}
