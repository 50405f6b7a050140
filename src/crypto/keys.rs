use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::cipher::{ChunkCipher, EncryptedChunk};
use super::error::{CryptoError, CryptoResult};
use crate::store::Database;

/// AES-256 key length in bytes
pub const KEY_LENGTH: usize = 32;

/// Config id under which the exported master key is persisted
pub const MASTER_KEY_ID: &str = "master_key";

const KEY_ALGORITHM: &str = "A256GCM";

pub struct MasterKey([u8; KEY_LENGTH]);

impl MasterKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    pub fn export(&self) -> ExportedKey {
        ExportedKey {
            alg: KEY_ALGORITHM.to_string(),
            k: hex::encode(self.0),
            created: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn import(exported: &ExportedKey) -> CryptoResult<Self> {
        if exported.alg != KEY_ALGORITHM {
            return Err(CryptoError::InvalidKey(format!(
                "unsupported algorithm {}",
                exported.alg
            )));
        }

        let raw = hex::decode(&exported.k).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let bytes: [u8; KEY_LENGTH] = raw.try_into().map_err(|raw: Vec<u8>| {
            CryptoError::InvalidKey(format!(
                "expected {} key bytes, got {}",
                KEY_LENGTH,
                raw.len()
            ))
        })?;

        Ok(Self(bytes))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Persisted form of the master key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedKey {
    pub alg: String,
    /// Hex-encoded raw key
    pub k: String,
    /// Unix millis
    pub created: i64,
}

/// Owns the master key of a local store.
///
/// The key lives in the same database as the chunks it protects. Anyone
/// holding a copy of the database file can decrypt every chunk.
pub struct KeyManager {
    db: Database,
    key_id: String,
    cipher: OnceCell<Arc<ChunkCipher>>,
}

impl KeyManager {
    pub fn new(db: Database) -> Self {
        Self::with_key_id(db, MASTER_KEY_ID)
    }

    pub fn with_key_id(db: Database, key_id: impl Into<String>) -> Self {
        Self {
            db,
            key_id: key_id.into(),
            cipher: OnceCell::new(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn is_initialized(&self) -> bool {
        self.cipher.initialized()
    }

    /// Load the persisted key, generating and persisting one on first use.
    ///
    /// Safe to call repeatedly and concurrently: calls on one manager share
    /// a single initialization, and a process that loses a first-write race
    /// against another process adopts the stored key instead of its own.
    pub async fn init(&self) -> CryptoResult<Arc<ChunkCipher>> {
        let cipher = self
            .cipher
            .get_or_try_init(|| self.load_or_generate())
            .await?;
        Ok(Arc::clone(cipher))
    }

    async fn load_or_generate(&self) -> CryptoResult<Arc<ChunkCipher>> {
        if let Some(key) = self.load().await? {
            tracing::info!(key_id = %self.key_id, "Loaded master key");
            return Ok(Arc::new(ChunkCipher::new(&key)));
        }

        let key = MasterKey::generate();
        let written = self
            .db
            .save_config_if_absent(&self.key_id, &key.export())
            .await
            .map_err(|e| CryptoError::Initialization(e.to_string()))?;

        if written {
            tracing::info!(key_id = %self.key_id, "Generated master key");
            return Ok(Arc::new(ChunkCipher::new(&key)));
        }

        tracing::warn!(key_id = %self.key_id, "Master key was created concurrently, adopting stored key");
        let stored = self.load().await?.ok_or_else(|| {
            CryptoError::Initialization(format!("key {} vanished after write", self.key_id))
        })?;
        Ok(Arc::new(ChunkCipher::new(&stored)))
    }

    async fn load(&self) -> CryptoResult<Option<MasterKey>> {
        let exported: Option<ExportedKey> = self
            .db
            .get_config(&self.key_id)
            .await
            .map_err(|e| CryptoError::Initialization(e.to_string()))?;

        exported
            .map(|exported| {
                MasterKey::import(&exported)
                    .map_err(|e| CryptoError::Initialization(e.to_string()))
            })
            .transpose()
    }

    pub async fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<EncryptedChunk> {
        self.init().await?.encrypt_chunk(plaintext)
    }

    pub async fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> CryptoResult<Vec<u8>> {
        self.init().await?.decrypt_chunk(ciphertext, iv)
    }
}
