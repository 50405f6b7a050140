use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::config::DfsConfig;

/// One stored piece of a file.
///
/// `chunk_id` is the SHA-256 of the chunk's plaintext, computed once at
/// ingestion. `data` is whatever was persisted: IV-prefixed ciphertext when
/// the chunk is encrypted, raw bytes otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub chunk_id: String,
    pub file_id: String,
    pub index: u32,
    pub data: Bytes,
    pub size: usize,
}

impl FileChunk {
    pub fn new(chunk_id: String, file_id: String, index: u32, data: Bytes) -> Self {
        let size = data.len();
        Self {
            chunk_id,
            file_id,
            index,
            data,
            size,
        }
    }
}

/// Where a chunk lives and how it is protected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkPlacement {
    pub chunk_id: String,
    /// Peers holding a copy. Empty means the chunk only exists locally.
    #[serde(default)]
    pub node_ids: Vec<String>,
    pub encrypted: bool,
    /// BLAKE3 of the stored bytes, independent of `chunk_id`
    pub checksum: String,
}

/// Replica count of a placement measured against the configured bounds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RedundancyStatus {
    LocalOnly,
    UnderReplicated,
    Satisfied,
    OverReplicated,
}

impl RedundancyStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, RedundancyStatus::Satisfied)
    }
}

impl ChunkPlacement {
    pub fn local(chunk_id: String, encrypted: bool, checksum: String) -> Self {
        Self {
            chunk_id,
            node_ids: Vec::new(),
            encrypted,
            checksum,
        }
    }

    /// Report only; nothing populates `node_ids` yet, so this is never
    /// enforced on write.
    pub fn redundancy_status(&self, config: &DfsConfig) -> RedundancyStatus {
        let replicas = self.node_ids.len() as u32;
        if replicas == 0 {
            RedundancyStatus::LocalOnly
        } else if replicas < config.min_redundancy {
            RedundancyStatus::UnderReplicated
        } else if replicas > config.max_redundancy {
            RedundancyStatus::OverReplicated
        } else {
            RedundancyStatus::Satisfied
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_id: String,
    pub filename: String,
    pub path: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Unix millis
    pub created: i64,
    /// Unix millis
    pub modified: i64,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    /// Reassembly order
    pub chunks: Vec<ChunkPlacement>,
    pub redundancy_level: u32,
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_id: Option<String>,
}

impl FileMetadata {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_ids(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.chunk_id.as_str())
    }
}

/// Descriptive record of a peer's storage capacity. Nothing in this crate
/// populates it; it is the contract for an external placement service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerStorageInfo {
    pub node_id: String,
    pub available_storage: u64,
    pub total_storage: u64,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}

impl PeerStorageInfo {
    pub fn used_storage(&self) -> u64 {
        self.total_storage.saturating_sub(self.available_storage)
    }

    pub fn can_accept(&self, bytes: u64) -> bool {
        self.is_online && self.available_storage >= bytes
    }
}
