//! Chunk vault: ingestion, reassembly and reconciliation
//!
//! Ties the crypto and store layers together. Chunks are always persisted
//! before the metadata that references them, and metadata is always
//! removed before its chunks, so every chunk named by a committed metadata
//! record exists in the chunk store.

pub mod chunker;
pub mod error;
pub mod types;
pub mod vault;

pub use chunker::Chunker;
pub use error::{VaultError, VaultResult};
pub use types::{ChunkHealth, ChunkStatus, FileHealth, NewFile};
pub use vault::ChunkVault;
