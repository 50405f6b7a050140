//! Cryptography for chunk payloads
//!
//! One AES-256-GCM master key per local store, loaded or generated lazily
//! by [`KeyManager`]. Every encryption draws a fresh 96-bit IV. Chunks are
//! addressed by the SHA-256 of their plaintext.

pub mod cipher;
pub mod error;
pub mod hash;
pub mod keys;

pub use cipher::{
    combine_iv_and_data, separate_iv_and_data, ChunkCipher, EncryptedChunk, IV_LENGTH,
};
pub use error::{CryptoError, CryptoResult};
pub use hash::{checksum, generate_hash, verify_checksum};
pub use keys::{ExportedKey, KeyManager, MasterKey, KEY_LENGTH, MASTER_KEY_ID};
