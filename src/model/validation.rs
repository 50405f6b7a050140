//! Schema checks for file metadata before it is committed

use super::config::DfsConfig;
use super::error::{ModelError, ModelResult};
use super::types::{ChunkPlacement, FileMetadata};

const HASH_HEX_LEN: usize = 64;

fn is_hash_hex(value: &str) -> bool {
    value.len() == HASH_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

impl FileMetadata {
    /// Check internal consistency of the record
    pub fn validate(&self) -> ModelResult<()> {
        if self.file_id.trim().is_empty() {
            return Err(ModelError::metadata(&self.file_id, "file_id is empty"));
        }

        if self.filename.trim().is_empty() {
            return Err(ModelError::metadata(&self.file_id, "filename is empty"));
        }

        // Every chunk carries at least one byte
        if self.chunks.is_empty() != (self.size == 0) {
            return Err(ModelError::metadata(
                &self.file_id,
                format!(
                    "{} chunks cannot reconstruct {} bytes",
                    self.chunks.len(),
                    self.size
                ),
            ));
        }
        if self.chunks.len() as u64 > self.size {
            return Err(ModelError::metadata(
                &self.file_id,
                format!("{} chunks exceed file size {}", self.chunks.len(), self.size),
            ));
        }

        if self.redundancy_level == 0 {
            return Err(ModelError::metadata(&self.file_id, "redundancy_level is 0"));
        }

        if self.encrypted && self.encryption_key_id.is_none() {
            return Err(ModelError::metadata(
                &self.file_id,
                "encrypted file has no encryption_key_id",
            ));
        }

        for (index, placement) in self.chunks.iter().enumerate() {
            self.validate_placement(index, placement)?;
        }

        Ok(())
    }

    fn validate_placement(&self, index: usize, placement: &ChunkPlacement) -> ModelResult<()> {
        if !is_hash_hex(&placement.chunk_id) {
            return Err(ModelError::metadata(
                &self.file_id,
                format!("chunk {} has malformed id {:?}", index, placement.chunk_id),
            ));
        }

        if !is_hash_hex(&placement.checksum) {
            return Err(ModelError::metadata(
                &self.file_id,
                format!("chunk {} has malformed checksum", index),
            ));
        }

        if placement.encrypted != self.encrypted {
            return Err(ModelError::metadata(
                &self.file_id,
                format!(
                    "chunk {} encrypted={} but file encrypted={}",
                    index, placement.encrypted, self.encrypted
                ),
            ));
        }

        Ok(())
    }

    /// Check the record against the active configuration
    pub fn validate_against(&self, config: &DfsConfig) -> ModelResult<()> {
        config.validate()?;
        self.validate()?;

        let minimum = config.expected_chunks(self.size);
        if (self.chunks.len() as u64) < minimum {
            return Err(ModelError::metadata(
                &self.file_id,
                format!(
                    "{} bytes need at least {} chunks of {} bytes, found {}",
                    self.size,
                    minimum,
                    config.chunk_size,
                    self.chunks.len()
                ),
            ));
        }

        if self.redundancy_level < config.min_redundancy
            || self.redundancy_level > config.max_redundancy
        {
            return Err(ModelError::metadata(
                &self.file_id,
                format!(
                    "redundancy_level {} outside [{}, {}]",
                    self.redundancy_level, config.min_redundancy, config.max_redundancy
                ),
            ));
        }

        Ok(())
    }
}
