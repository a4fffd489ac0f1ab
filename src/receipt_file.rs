//! On-disk storage for uploaded receipt documents.
//!
//! Files land under a configured upload root with a deterministic name built
//! from the registration identity and a timestamp. Writes go through a
//! temporary file in the same directory and an atomic rename, so a crashed or
//! timed-out request never leaves a half-written file that looks stored.

use crate::error::CompletionError;
use crate::model::Registration;
use crate::translit::transliterate;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const RECEIPT_EXTENSION: &str = ".pdf";

/// A stored receipt document.
#[derive(Debug, Clone)]
pub struct StoredReceipt {
    pub path: PathBuf,
    pub size: u64,
}

pub struct ReceiptFileStore {
    root: PathBuf,
}

impl ReceiptFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates the upload and writes it under the upload root.
    ///
    /// Rejects anything that is not named as a PDF before touching the disk.
    /// Returns the on-disk path; the caller keeps the original filename as
    /// display metadata.
    pub fn store(
        &self,
        registration: &Registration,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredReceipt, CompletionError> {
        if !original_name.to_lowercase().ends_with(RECEIPT_EXTENSION) {
            return Err(CompletionError::InvalidFormat);
        }

        let file_name = generate_receipt_name(registration, original_name, Utc::now());
        let path = self.root.join(&file_name);

        std::fs::create_dir_all(&self.root).map_err(CompletionError::FileStore)?;

        let mut tmp = NamedTempFile::new_in(&self.root).map_err(CompletionError::FileStore)?;
        tmp.write_all(bytes).map_err(CompletionError::FileStore)?;
        tmp.as_file().sync_all().map_err(CompletionError::FileStore)?;
        tmp.persist(&path)
            .map_err(|e| CompletionError::FileStore(e.error))?;

        debug!(path = %path.display(), size = bytes.len(), "receipt file stored");

        Ok(StoredReceipt {
            path,
            size: bytes.len() as u64,
        })
    }
}

/// Builds `{id}_{first}_{last}_{yyyyMMdd_HHmmss}{ext}` with transliterated
/// name parts. The extension comes from the upload, lowercased, falling back
/// to `.pdf` when the name has no usable extension.
fn generate_receipt_name(
    registration: &Registration,
    original_name: &str,
    now: DateTime<Utc>,
) -> String {
    let first = transliterate(&registration.first_name);
    let last = transliterate(&registration.last_name);
    let timestamp = now.format("%Y%m%d_%H%M%S");

    let extension = match original_name.rfind('.') {
        Some(idx) if idx > 0 => original_name[idx..].to_lowercase(),
        _ => RECEIPT_EXTENSION.to_string(),
    };

    format!("{}_{}_{}_{}{}", registration.id, first, last, timestamp, extension)
}
