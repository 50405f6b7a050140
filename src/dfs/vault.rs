use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::chunker::Chunker;
use super::error::{VaultError, VaultResult};
use super::types::{ChunkHealth, ChunkStatus, FileHealth, NewFile};
use crate::crypto::{
    checksum, generate_hash, verify_checksum, ChunkCipher, CryptoError, EncryptedChunk,
    KeyManager,
};
use crate::metrics;
use crate::model::{ChunkPlacement, DfsConfig, FileChunk, FileMetadata, ModelError};
use crate::store::{Database, GcStats, StoreStats};

const SETTINGS_ID: &str = "vault_settings";

/// Settings fixed for the lifetime of a store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct VaultSettings {
    encrypt_chunks: bool,
}

/// Encrypted, content-addressed file store over one local database.
///
/// Concurrent writers of the same file id are last-writer-wins; there is no
/// version check on metadata.
pub struct ChunkVault {
    db: Database,
    keys: KeyManager,
    config: DfsConfig,
    chunker: Chunker,
}

impl ChunkVault {
    /// Open a vault, creating the schema and (when encrypting) the master key
    pub async fn open(db: Database, config: DfsConfig) -> VaultResult<Self> {
        config.validate()?;
        let chunker = Chunker::from_config(&config)?;
        metrics::init_metrics();

        let settings = VaultSettings {
            encrypt_chunks: config.encrypt_chunks,
        };
        db.save_config_if_absent(SETTINGS_ID, &settings).await?;
        let stored: Option<VaultSettings> = db.get_config(SETTINGS_ID).await?;
        if let Some(stored) = stored {
            if stored != settings {
                return Err(VaultError::Config(format!(
                    "store was created with encrypt_chunks={}, config has {}",
                    stored.encrypt_chunks, settings.encrypt_chunks
                )));
            }
        }

        let keys = KeyManager::new(db.clone());
        if config.encrypt_chunks {
            keys.init().await?;
        }

        tracing::info!(
            url = %db.url(),
            chunk_size = config.chunk_size,
            encrypt = config.encrypt_chunks,
            "Chunk vault ready"
        );

        Ok(Self {
            db,
            keys,
            config,
            chunker,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &DfsConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub async fn encrypt(&self, plaintext: &[u8]) -> VaultResult<EncryptedChunk> {
        Ok(self.keys.encrypt(plaintext).await?)
    }

    pub async fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> VaultResult<Vec<u8>> {
        Ok(self.keys.decrypt(ciphertext, iv).await?)
    }

    pub fn hash(data: &[u8]) -> String {
        generate_hash(data)
    }

    async fn cipher(&self) -> VaultResult<Option<Arc<ChunkCipher>>> {
        if self.config.encrypt_chunks {
            Ok(Some(self.keys.init().await?))
        } else {
            Ok(None)
        }
    }

    /// Split, encrypt and persist a file, then commit its metadata.
    ///
    /// Re-ingesting an existing file id keeps its `created` time and, once
    /// the new metadata is committed, releases chunks only the old version
    /// used.
    pub async fn ingest(&self, file: NewFile) -> VaultResult<FileMetadata> {
        let timer = metrics::IngestTimer::start();

        let file_id = file
            .file_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if file.filename.trim().is_empty() {
            return Err(ModelError::metadata(&file_id, "filename is empty").into());
        }

        let previous = self.db.get_metadata(&file_id).await?;
        let cipher = self.cipher().await?;

        let (placements, keep) = match self
            .store_pieces(&file_id, &file.data, cipher.as_deref())
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                self.release_uncommitted(&file_id).await;
                return Err(e);
            }
        };

        let now = chrono::Utc::now().timestamp_millis();
        let metadata = FileMetadata {
            file_id: file_id.clone(),
            path: file.path.unwrap_or_else(|| format!("/{}", file.filename)),
            filename: file.filename,
            size: file.data.len() as u64,
            mime_type: file.mime_type,
            created: previous.as_ref().map(|p| p.created).unwrap_or(now),
            modified: now,
            owner: file.owner,
            permissions: file.permissions,
            chunks: placements,
            redundancy_level: self.config.min_redundancy,
            encrypted: cipher.is_some(),
            encryption_key_id: cipher.as_ref().map(|_| self.keys.key_id().to_string()),
        };

        if let Err(e) = metadata.validate_against(&self.config) {
            self.release_uncommitted(&file_id).await;
            return Err(e.into());
        }

        // Chunks are durable; committing the metadata makes them visible
        if let Err(e) = self.db.save_metadata(&metadata).await {
            self.release_uncommitted(&file_id).await;
            return Err(e.into());
        }

        if previous.is_some() {
            let released = self.db.prune_file_chunks(&file_id, &keep).await?;
            tracing::debug!(file_id = %file_id, released, "Released chunks of previous version");
        }

        tracing::info!(
            file_id = %file_id,
            size = metadata.size,
            chunks = metadata.chunk_count(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Ingested file"
        );
        timer.complete();

        Ok(metadata)
    }

    /// Persist every piece of `data` in order. Returns the placements and the
    /// `(chunk_id, index)` refs they occupy.
    async fn store_pieces(
        &self,
        file_id: &str,
        data: &Bytes,
        cipher: Option<&ChunkCipher>,
    ) -> VaultResult<(Vec<ChunkPlacement>, HashSet<(String, u32)>)> {
        let pieces = self.chunker.split(data);
        let mut placements = Vec::with_capacity(pieces.len());
        let mut keep = HashSet::with_capacity(pieces.len());

        for (index, piece) in pieces.iter().enumerate() {
            let index = u32::try_from(index).map_err(|_| {
                ModelError::metadata(file_id, format!("chunk index {} out of range", index))
            })?;
            // Hash the plaintext so identical content collapses to one blob
            let chunk_id = generate_hash(piece);
            let stored = self
                .store_piece(file_id, index, &chunk_id, piece, cipher)
                .await?;

            placements.push(ChunkPlacement::local(
                chunk_id.clone(),
                cipher.is_some(),
                checksum(&stored),
            ));
            keep.insert((chunk_id, index));
        }

        Ok((placements, keep))
    }

    /// Persist one piece and return the bytes actually held by the store
    async fn store_piece(
        &self,
        file_id: &str,
        index: u32,
        chunk_id: &str,
        piece: &Bytes,
        cipher: Option<&ChunkCipher>,
    ) -> VaultResult<Bytes> {
        if let Some(existing) = self.db.get_chunk(chunk_id).await? {
            let link = FileChunk::new(chunk_id.to_string(), file_id.to_string(), index, existing.data);
            self.db.save_chunk(&link).await?;
            metrics::record_chunk_written(link.size, true);
            return Ok(link.data);
        }

        let data = match cipher {
            Some(cipher) => Bytes::from(cipher.seal(piece)?),
            None => piece.clone(),
        };
        let chunk = FileChunk::new(chunk_id.to_string(), file_id.to_string(), index, data);
        let inserted = self.db.save_chunk(&chunk).await?;
        metrics::record_chunk_written(chunk.size, !inserted);

        if inserted {
            return Ok(chunk.data);
        }

        // Another writer stored the same content first
        Ok(self.require_chunk(chunk_id).await?.data)
    }

    /// Undo chunk references written by a failed ingestion.
    ///
    /// Refs named by whatever metadata is committed now are kept, including
    /// one committed by a concurrent writer. Anything this misses is left to
    /// `collect_garbage`.
    async fn release_uncommitted(&self, file_id: &str) {
        let committed = match self.db.get_metadata(file_id).await {
            Ok(committed) => committed,
            Err(e) => {
                tracing::warn!(file_id = %file_id, "Failed to release uncommitted chunks: {}", e);
                return;
            }
        };

        let keep: HashSet<(String, u32)> = committed
            .map(|m| {
                m.chunks
                    .into_iter()
                    .zip(0u32..)
                    .map(|(c, i)| (c.chunk_id, i))
                    .collect()
            })
            .unwrap_or_default();

        match self.db.prune_file_chunks(file_id, &keep).await {
            Ok(released) => {
                tracing::debug!(file_id = %file_id, released, "Released uncommitted chunks")
            }
            Err(e) => {
                tracing::warn!(file_id = %file_id, "Failed to release uncommitted chunks: {}", e)
            }
        }
    }

    pub async fn get_metadata(&self, file_id: &str) -> VaultResult<FileMetadata> {
        self.db
            .get_metadata(file_id)
            .await?
            .ok_or_else(|| VaultError::file_not_found(file_id))
    }

    pub async fn require_chunk(&self, chunk_id: &str) -> VaultResult<FileChunk> {
        self.db
            .get_chunk(chunk_id)
            .await?
            .ok_or_else(|| VaultError::chunk_not_found(chunk_id))
    }

    pub async fn list_files(&self) -> VaultResult<Vec<FileMetadata>> {
        Ok(self.db.list_all_metadata().await?)
    }

    /// Fetch, authenticate and decrypt the chunk a placement points at
    pub async fn read_chunk(&self, placement: &ChunkPlacement) -> VaultResult<Bytes> {
        let chunk = self.require_chunk(&placement.chunk_id).await?;

        let plaintext = if placement.encrypted {
            let cipher = self.keys.init().await?;
            let opened = cipher.open(&chunk.data).map_err(|e| match e {
                CryptoError::Authentication | CryptoError::BufferTooShort { .. } => {
                    metrics::record_auth_failure("decrypt");
                    tracing::warn!(chunk_id = %placement.chunk_id, "Chunk failed authentication");
                    VaultError::Authentication {
                        chunk_id: Some(placement.chunk_id.clone()),
                    }
                }
                other => other.into(),
            })?;
            Bytes::from(opened)
        } else {
            chunk.data.clone()
        };

        if !verify_checksum(&chunk.data, &placement.checksum)
            || generate_hash(&plaintext) != placement.chunk_id
        {
            metrics::record_auth_failure("checksum");
            tracing::warn!(chunk_id = %placement.chunk_id, "Chunk checksum mismatch");
            return Err(VaultError::Integrity {
                chunk_id: placement.chunk_id.clone(),
            });
        }

        Ok(plaintext)
    }

    /// Reassemble a file in the order its metadata lists the chunks
    pub async fn read_file(&self, file_id: &str) -> VaultResult<Bytes> {
        let metadata = self.get_metadata(file_id).await?;
        let mut buffer = BytesMut::with_capacity(metadata.size as usize);

        for placement in &metadata.chunks {
            let plaintext = self.read_chunk(placement).await?;
            buffer.extend_from_slice(&plaintext);
        }

        if buffer.len() as u64 != metadata.size {
            return Err(VaultError::SizeMismatch {
                file_id: file_id.to_string(),
                expected: metadata.size,
                actual: buffer.len() as u64,
            });
        }

        Ok(buffer.freeze())
    }

    /// Delete a file: metadata first, then its chunks.
    ///
    /// Returns whether a metadata record existed. Chunks are cleaned up
    /// either way.
    pub async fn delete_file(&self, file_id: &str) -> VaultResult<bool> {
        let existed = self.db.delete_metadata(file_id).await?;
        let removed = self.db.delete_chunks_for_file(file_id).await?;

        if existed {
            metrics::record_file_deleted();
        }
        tracing::info!(file_id = %file_id, existed, chunks_removed = removed, "Deleted file");

        Ok(existed)
    }

    /// Check every chunk of a file without reassembling it
    pub async fn verify_file(&self, file_id: &str) -> VaultResult<FileHealth> {
        use futures::stream::{self, StreamExt, TryStreamExt};

        let metadata = self.get_metadata(file_id).await?;

        let mut chunks: Vec<ChunkHealth> = stream::iter(metadata.chunks.iter().enumerate())
            .map(|(index, placement)| async move {
                let status = match self.read_chunk(placement).await {
                    Ok(_) => ChunkStatus::Healthy,
                    Err(VaultError::NotFound { .. }) => ChunkStatus::Missing,
                    Err(VaultError::Authentication { .. }) => ChunkStatus::Tampered,
                    Err(VaultError::Integrity { .. }) => ChunkStatus::ChecksumMismatch,
                    Err(e) => return Err(e),
                };

                Ok(ChunkHealth {
                    index: index as u32,
                    chunk_id: placement.chunk_id.clone(),
                    status,
                    redundancy: placement.redundancy_status(&self.config),
                })
            })
            .buffer_unordered(num_cpus::get())
            .try_collect()
            .await?;

        chunks.sort_by_key(|c| c.index);

        Ok(FileHealth {
            file_id: file_id.to_string(),
            chunks,
            verified_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Remove chunk rows no metadata references.
    ///
    /// Rows younger than `grace` are left alone since they may belong to an
    /// ingestion that has not committed its metadata yet.
    pub async fn collect_garbage(&self, grace: Duration) -> VaultResult<GcStats> {
        let cutoff = chrono::Utc::now().timestamp_millis() - grace.as_millis() as i64;
        let stats = self.db.collect_orphans(cutoff).await?;

        metrics::record_orphans_collected(stats.refs_removed + stats.chunks_removed);
        tracing::info!(
            refs_removed = stats.refs_removed,
            chunks_removed = stats.chunks_removed,
            "Collected orphaned chunks"
        );

        Ok(stats)
    }

    pub async fn stats(&self) -> VaultResult<StoreStats> {
        let stats = self.db.stats().await?;
        metrics::set_stored_files(stats.files);
        Ok(stats)
    }
}
