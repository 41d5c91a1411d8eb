//! File Encryption
//!
//! A file is read whole, base64-encoded and sealed as one record written next
//! to it as `<name>.<suffix>`. The plaintext is deleted afterwards; a failed
//! delete is logged and reported, and the encrypted copy stays in place.
//!
//! The encrypted copy is renamed into place before the plaintext is removed.
//! A crash between the rename and `remove_file` leaves both files on disk,
//! and the plaintext has to be removed by hand or by a later run.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{DecryptionError, EncryptionService, Result};
use crate::utils::io;

pub const DEFAULT_SUFFIX: &str = "encrypted";

/// Outcome of [`EncryptionService::encrypt_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptedFile {
    pub path: PathBuf,
    /// `false` when the plaintext could not be deleted.
    pub plaintext_removed: bool,
}

impl EncryptionService {
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn encrypt_file(&self, path: &Path) -> Result<EncryptedFile> {
        let plaintext = std::fs::read(path)?;
        let record = self.encrypt_data(BASE64.encode(&plaintext).as_bytes())?;

        let target = io::with_suffix(path, self.encrypted_suffix());
        io::write_atomic(&target, record.as_bytes())?;

        let plaintext_removed = match std::fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "encrypted copy written but plaintext could not be removed");
                false
            }
        };

        info!(encrypted = %target.display(), bytes = plaintext.len(), "file encrypted");
        Ok(EncryptedFile {
            path: target,
            plaintext_removed,
        })
    }

    /// Restores the plaintext next to the encrypted file, which is kept.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn decrypt_file(&self, path: &Path) -> Result<PathBuf> {
        let target = io::strip_suffix(path, self.encrypted_suffix())
            .ok_or_else(|| DecryptionError::Suffix(self.encrypted_suffix().to_string()))?;

        let record = std::fs::read_to_string(path)?;
        let encoded = self.decrypt_data(&record)?;
        let plaintext = BASE64
            .decode(&encoded)
            .map_err(|_| DecryptionError::Base64)?;

        io::write_atomic(&target, &plaintext)?;
        info!(restored = %target.display(), bytes = plaintext.len(), "file decrypted");
        Ok(target)
    }
}
