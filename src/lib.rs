//! Encrypted, content-addressed chunk store
//!
//! Files are split into chunks, each chunk is keyed by the SHA-256 of its
//! plaintext, sealed with AES-256-GCM under a per-store master key and
//! persisted in a local SQLite database alongside the file metadata that
//! lists the chunks in reassembly order.

pub mod crypto;
pub mod dfs;
pub mod metrics;
pub mod model;
pub mod store;

pub use dfs::{ChunkVault, NewFile, VaultError, VaultResult};
pub use model::{ChunkPlacement, DfsConfig, FileChunk, FileMetadata, PeerStorageInfo};
pub use store::Database;
