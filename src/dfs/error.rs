use thiserror::Error;

use crate::crypto::CryptoError;
use crate::model::ModelError;
use crate::store::StoreError;

/// Errors surfaced to vault callers.
///
/// `NotFound` and the corruption variants are deliberately distinct: a
/// missing chunk calls for re-ingestion, a corrupted one for re-fetching a
/// replica.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error(
        "Authentication failed for chunk {}: corrupted or tampered",
        .chunk_id.as_deref().unwrap_or("<detached>")
    )]
    Authentication { chunk_id: Option<String> },

    #[error("Checksum mismatch for chunk {chunk_id}")]
    Integrity { chunk_id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Reassembled {actual} bytes for file {file_id}, expected {expected}")]
    SizeMismatch {
        file_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error("Validation error: {0}")]
    Validation(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Initialization(msg) => VaultError::Initialization(msg),
            CryptoError::Authentication => VaultError::Authentication { chunk_id: None },
            other => VaultError::Crypto(other),
        }
    }
}

impl VaultError {
    pub(crate) fn chunk_not_found(chunk_id: &str) -> Self {
        VaultError::NotFound {
            kind: "Chunk",
            id: chunk_id.to_string(),
        }
    }

    pub(crate) fn file_not_found(file_id: &str) -> Self {
        VaultError::NotFound {
            kind: "File",
            id: file_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound { .. })
    }

    /// The stored bytes exist but cannot be trusted
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            VaultError::Authentication { .. } | VaultError::Integrity { .. }
        )
    }

    /// Store failures may be transient; retry policy belongs to the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Storage(StoreError::DatabaseError(_)))
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
