use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::model::RedundancyStatus;

/// A file handed to [`crate::dfs::ChunkVault::ingest`]
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Reusing an existing id replaces that file
    pub file_id: Option<String>,
    pub filename: String,
    pub path: Option<String>,
    pub owner: String,
    pub mime_type: Option<String>,
    pub permissions: Option<String>,
    pub data: Bytes,
}

impl NewFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_id: None,
            filename: filename.into(),
            path: None,
            owner: "local".to_string(),
            mime_type: None,
            permissions: None,
            data: data.into(),
        }
    }

    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = Some(permissions.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChunkStatus {
    Healthy,
    Missing,
    /// Stored bytes do not match the placement checksum or content hash
    ChecksumMismatch,
    /// Authenticated decryption failed
    Tampered,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkHealth {
    pub index: u32,
    pub chunk_id: String,
    pub status: ChunkStatus,
    pub redundancy: RedundancyStatus,
}

/// Verification report for one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHealth {
    pub file_id: String,
    /// In reassembly order
    pub chunks: Vec<ChunkHealth>,
    pub verified_at: i64,
}

impl FileHealth {
    pub fn is_healthy(&self) -> bool {
        self.chunks.iter().all(|c| c.status == ChunkStatus::Healthy)
    }

    pub fn count(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }

    /// Chunks a placement service would need to re-fetch or re-ingest
    pub fn damaged(&self) -> impl Iterator<Item = &ChunkHealth> {
        self.chunks.iter().filter(|c| c.status != ChunkStatus::Healthy)
    }
}
