use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{ModelError, ModelResult};

const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Configuration of the distributed store.
///
/// `chunk_size` is honoured by [`crate::dfs::Chunker`]. The redundancy,
/// quota and sync fields describe the peer placement service, which lives
/// outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DfsConfig {
    pub chunk_size: usize,
    pub min_redundancy: u32,
    pub max_redundancy: u32,
    pub quota_per_peer: u64,
    pub sync_interval: Duration,
    pub encrypt_chunks: bool,
    pub use_cloud_fallback: bool,
    pub use_relay: bool,
}

impl Default for DfsConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024,
            min_redundancy: 1,
            max_redundancy: 3,
            quota_per_peer: 1024 * 1024 * 1024, // 1GB
            sync_interval: Duration::from_secs(30),
            encrypt_chunks: true,
            use_cloud_fallback: false,
            use_relay: false,
        }
    }
}

impl DfsConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> ModelResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: DfsConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_encryption(mut self, encrypt_chunks: bool) -> Self {
        self.encrypt_chunks = encrypt_chunks;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ModelError::InvalidConfig(format!(
                "chunk_size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }

        if self.min_redundancy == 0 {
            return Err(ModelError::InvalidConfig(
                "min_redundancy must be at least 1".to_string(),
            ));
        }

        if self.min_redundancy > self.max_redundancy {
            return Err(ModelError::InvalidConfig(format!(
                "min_redundancy {} exceeds max_redundancy {}",
                self.min_redundancy, self.max_redundancy
            )));
        }

        if self.quota_per_peer == 0 {
            return Err(ModelError::InvalidConfig(
                "quota_per_peer must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of chunks a file of `size` bytes splits into. Call on a
    /// validated config; `chunk_size` must be non-zero.
    pub fn expected_chunks(&self, size: u64) -> u64 {
        size.div_ceil(self.chunk_size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(DfsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero_chunk = DfsConfig::default().with_chunk_size(0);
        assert!(zero_chunk.validate().is_err());

        let inverted = DfsConfig {
            min_redundancy: 4,
            max_redundancy: 2,
            ..DfsConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ModelError::InvalidConfig(_))
        ));

        let no_quota = DfsConfig {
            quota_per_peer: 0,
            ..DfsConfig::default()
        };
        assert!(no_quota.validate().is_err());
    }

    #[test]
    fn test_expected_chunks() {
        let config = DfsConfig::default().with_chunk_size(3);
        assert_eq!(config.expected_chunks(0), 0);
        assert_eq!(config.expected_chunks(3), 1);
        assert_eq!(config.expected_chunks(9), 3);
        assert_eq!(config.expected_chunks(10), 4);
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"chunk_size": 1024, "encrypt_chunks": false}}"#).unwrap();

        let config = DfsConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert!(!config.encrypt_chunks);
        assert_eq!(config.max_redundancy, DfsConfig::default().max_redundancy);
    }

    #[test]
    fn test_from_json_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"min_redundancy": 0}}"#).unwrap();

        assert!(DfsConfig::from_json_file(file.path()).is_err());
    }
}
