//! Data model shared by the crypto and storage layers
//!
//! Describes how a file is split into content-addressed chunks, how each
//! chunk is protected, and where (in design) its replicas live.

pub mod config;
pub mod error;
pub mod types;
pub mod validation;

pub use config::DfsConfig;
pub use error::{ModelError, ModelResult};
pub use types::{ChunkPlacement, FileChunk, FileMetadata, PeerStorageInfo, RedundancyStatus};
