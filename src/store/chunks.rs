use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashSet;

use super::database::{now_millis, Database};
use super::error::{StoreError, StoreResult};
use crate::model::FileChunk;

/// Row counts of the local store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    pub files: u64,
    pub chunks: u64,
    pub chunk_refs: u64,
    pub stored_bytes: u64,
}

/// Result of an orphan collection pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GcStats {
    pub refs_removed: u64,
    pub chunks_removed: u64,
}

fn chunk_from_row(row: &SqliteRow) -> StoreResult<FileChunk> {
    let index: i64 = row.try_get::<Option<i64>, _>("chunk_index")?.unwrap_or(0);
    let index = u32::try_from(index).map_err(|_| StoreError::InvalidRow {
        table: "chunk_refs",
        reason: format!("chunk_index {} out of range", index),
    })?;
    let data: Vec<u8> = row.try_get("data")?;

    Ok(FileChunk::new(
        row.try_get("chunk_id")?,
        row.try_get::<Option<String>, _>("file_id")?
            .unwrap_or_default(),
        index,
        Bytes::from(data),
    ))
}

impl Database {
    /// Store a chunk and record that `chunk.file_id` uses it at `chunk.index`.
    ///
    /// A blob that already exists under the same hash is kept as is; only the
    /// reference is added. Returns `true` when new bytes were written.
    pub async fn save_chunk(&self, chunk: &FileChunk) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let now = now_millis();
        let mut tx = pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO chunks (chunk_id, data, size, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO NOTHING
            "#,
        )
        .bind(&chunk.chunk_id)
        .bind(chunk.data.as_ref())
        .bind(chunk.data.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO chunk_refs (chunk_id, file_id, chunk_index, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.file_id)
        .bind(chunk.index as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if !inserted {
            tracing::debug!(chunk_id = %chunk.chunk_id, file_id = %chunk.file_id, "Deduplicated chunk");
        }
        Ok(inserted)
    }

    /// Load a chunk by content hash.
    ///
    /// A blob shared by several files reports its oldest reference as
    /// `file_id`/`index`; a blob with no references reports an empty
    /// `file_id`.
    pub async fn get_chunk(&self, chunk_id: &str) -> StoreResult<Option<FileChunk>> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            r#"
            SELECT c.chunk_id, c.data, r.file_id, r.chunk_index
            FROM chunks c
            LEFT JOIN chunk_refs r ON r.chunk_id = c.chunk_id
            WHERE c.chunk_id = ?
            ORDER BY r.created_at, r.rowid
            LIMIT 1
            "#,
        )
        .bind(chunk_id)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(chunk_from_row).transpose()
    }

    pub async fn chunk_exists(&self, chunk_id: &str) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    /// All chunks referenced by `file_id`, via the file index.
    ///
    /// Rows come back in no particular order; reassembly order is defined by
    /// the file's metadata.
    pub async fn get_chunks_for_file(&self, file_id: &str) -> StoreResult<Vec<FileChunk>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            r#"
            SELECT r.chunk_id, r.file_id, r.chunk_index, c.data
            FROM chunk_refs r
            JOIN chunks c ON c.chunk_id = r.chunk_id
            WHERE r.file_id = ?
            "#,
        )
        .bind(file_id)
        .fetch_all(pool)
        .await?;

        rows.iter().map(chunk_from_row).collect()
    }

    /// Remove a blob and every reference to it
    pub async fn delete_chunk(&self, chunk_id: &str) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM chunk_refs WHERE chunk_id = ?")
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM chunks WHERE chunk_id = ?")
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop every reference held by `file_id`, then every blob left without
    /// references. Blobs still used by other files stay.
    ///
    /// Returns the number of blobs removed.
    pub async fn delete_chunks_for_file(&self, file_id: &str) -> StoreResult<u64> {
        self.prune_file_chunks(file_id, &HashSet::new()).await
    }

    /// Drop the references of `file_id` that are not in `keep`
    /// (`(chunk_id, index)` pairs), then the blobs they orphaned.
    ///
    /// Returns the number of blobs removed.
    pub async fn prune_file_chunks(
        &self,
        file_id: &str,
        keep: &HashSet<(String, u32)>,
    ) -> StoreResult<u64> {
        let pool = self.pool().await?;

        // Scan the file index before opening the write transaction so the
        // transaction starts with a write and never upgrades a read snapshot
        let rows = sqlx::query("SELECT chunk_id, chunk_index FROM chunk_refs WHERE file_id = ?")
            .bind(file_id)
            .fetch_all(pool)
            .await?;

        let mut tx = pool.begin().await?;
        let mut released = HashSet::new();
        for row in rows {
            let chunk_id: String = row.try_get("chunk_id")?;
            let index: i64 = row.try_get("chunk_index")?;
            let position = u32::try_from(index).map_err(|_| StoreError::InvalidRow {
                table: "chunk_refs",
                reason: format!("chunk_index {} out of range", index),
            })?;
            if keep.contains(&(chunk_id.clone(), position)) {
                continue;
            }

            sqlx::query(
                "DELETE FROM chunk_refs WHERE file_id = ? AND chunk_id = ? AND chunk_index = ?",
            )
            .bind(file_id)
            .bind(&chunk_id)
            .bind(index)
            .execute(&mut *tx)
            .await?;
            released.insert(chunk_id);
        }

        let mut removed = 0;
        for chunk_id in &released {
            let result = sqlx::query(
                r#"
                DELETE FROM chunks
                WHERE chunk_id = ?
                AND NOT EXISTS (SELECT 1 FROM chunk_refs WHERE chunk_id = ?)
                "#,
            )
            .bind(chunk_id)
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;
            removed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Remove references no metadata record names, then blobs with no
    /// references, considering only rows written before `cutoff_millis`.
    ///
    /// A reference is kept only while its file's metadata lists the same
    /// `chunk_id` at the same position. Rows newer than the cutoff may belong
    /// to an ingestion that has not committed its metadata yet.
    pub async fn collect_orphans(&self, cutoff_millis: i64) -> StoreResult<GcStats> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let unowned = sqlx::query(
            r#"
            DELETE FROM chunk_refs
            WHERE created_at < ?
            AND file_id NOT IN (SELECT file_id FROM metadata)
            "#,
        )
        .bind(cutoff_millis)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Superseded or never-committed refs of files that do have metadata
        let unlisted = sqlx::query(
            r#"
            DELETE FROM chunk_refs
            WHERE created_at < ?
            AND NOT EXISTS (
                SELECT 1
                FROM metadata m, json_each(m.metadata, '$.chunks') j
                WHERE m.file_id = chunk_refs.file_id
                AND j.key = chunk_refs.chunk_index
                AND json_extract(j.value, '$.chunk_id') = chunk_refs.chunk_id
            )
            "#,
        )
        .bind(cutoff_millis)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let refs_removed = unowned + unlisted;

        let chunks_removed = sqlx::query(
            r#"
            DELETE FROM chunks
            WHERE created_at < ?
            AND chunk_id NOT IN (SELECT chunk_id FROM chunk_refs)
            "#,
        )
        .bind(cutoff_millis)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(GcStats {
            refs_removed,
            chunks_removed,
        })
    }

    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM metadata) AS files,
                (SELECT COUNT(*) FROM chunks) AS chunks,
                (SELECT COUNT(*) FROM chunk_refs) AS chunk_refs,
                (SELECT COALESCE(SUM(size), 0) FROM chunks) AS stored_bytes
            "#,
        )
        .fetch_one(pool)
        .await?;

        Ok(StoreStats {
            files: row.try_get::<i64, _>("files")? as u64,
            chunks: row.try_get::<i64, _>("chunks")? as u64,
            chunk_refs: row.try_get::<i64, _>("chunk_refs")? as u64,
            stored_bytes: row.try_get::<i64, _>("stored_bytes")? as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(chunk_id: &str, file_id: &str, index: u32, data: &'static [u8]) -> FileChunk {
        FileChunk::new(
            chunk_id.to_string(),
            file_id.to_string(),
            index,
            Bytes::from_static(data),
        )
    }

    #[tokio::test]
    async fn test_save_and_get_chunk() {
        let db = Database::in_memory();
        let stored = chunk("h1", "f1", 0, b"payload");

        assert!(db.save_chunk(&stored).await.unwrap());

        let loaded = db.get_chunk("h1").await.unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(db.chunk_exists("h1").await.unwrap());
        assert!(db.get_chunk("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identical_hash_is_stored_once() {
        let db = Database::in_memory();

        assert!(db.save_chunk(&chunk("same", "f1", 0, b"first")).await.unwrap());
        assert!(!db.save_chunk(&chunk("same", "f2", 3, b"second")).await.unwrap());

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.chunk_refs, 2);

        // First writer's bytes win
        let loaded = db.get_chunk("same").await.unwrap().unwrap();
        assert_eq!(loaded.data.as_ref(), b"first");
        assert_eq!(loaded.file_id, "f1");

        let f2 = db.get_chunks_for_file("f2").await.unwrap();
        assert_eq!(f2.len(), 1);
        assert_eq!(f2[0].index, 3);
        assert_eq!(f2[0].file_id, "f2");
    }

    #[tokio::test]
    async fn test_get_chunks_for_file() {
        let db = Database::in_memory();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            db.save_chunk(&chunk(id, "f1", i as u32, b"x")).await.unwrap();
        }
        db.save_chunk(&chunk("z", "f2", 0, b"y")).await.unwrap();

        let mut chunks = db.get_chunks_for_file("f1").await.unwrap();
        chunks.sort_by_key(|c| c.index);
        let ids: Vec<_> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert!(db.get_chunks_for_file("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_chunks_for_file_spares_other_files() {
        let db = Database::in_memory();
        db.save_chunk(&chunk("shared", "f1", 0, b"s")).await.unwrap();
        db.save_chunk(&chunk("own", "f1", 1, b"o")).await.unwrap();
        db.save_chunk(&chunk("shared", "f2", 0, b"s")).await.unwrap();
        db.save_chunk(&chunk("other", "f2", 1, b"t")).await.unwrap();

        let removed = db.delete_chunks_for_file("f1").await.unwrap();
        assert_eq!(removed, 1);

        assert!(db.get_chunks_for_file("f1").await.unwrap().is_empty());
        assert!(!db.chunk_exists("own").await.unwrap());
        assert!(db.chunk_exists("shared").await.unwrap());
        assert_eq!(db.get_chunks_for_file("f2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_same_chunk_twice_in_one_file() {
        let db = Database::in_memory();
        db.save_chunk(&chunk("rep", "f1", 0, b"r")).await.unwrap();
        db.save_chunk(&chunk("rep", "f1", 1, b"r")).await.unwrap();

        assert_eq!(db.get_chunks_for_file("f1").await.unwrap().len(), 2);
        assert_eq!(db.delete_chunks_for_file("f1").await.unwrap(), 1);
        assert_eq!(db.stats().await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_prune_keeps_listed_refs() {
        let db = Database::in_memory();
        db.save_chunk(&chunk("old", "f1", 0, b"o")).await.unwrap();
        db.save_chunk(&chunk("new", "f1", 0, b"n")).await.unwrap();

        let keep = HashSet::from([("new".to_string(), 0u32)]);
        assert_eq!(db.prune_file_chunks("f1", &keep).await.unwrap(), 1);

        let chunks = db.get_chunks_for_file("f1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "new");
    }

    #[tokio::test]
    async fn test_delete_chunk_removes_refs() {
        let db = Database::in_memory();
        db.save_chunk(&chunk("h", "f1", 0, b"x")).await.unwrap();
        db.save_chunk(&chunk("h", "f2", 0, b"x")).await.unwrap();

        assert!(db.delete_chunk("h").await.unwrap());
        assert!(!db.delete_chunk("h").await.unwrap());
        assert_eq!(db.stats().await.unwrap().chunk_refs, 0);
    }

    #[tokio::test]
    async fn test_collect_orphans_respects_cutoff() {
        let db = Database::in_memory();
        db.save_chunk(&chunk("h", "ghost", 0, b"x")).await.unwrap();

        let before = db.collect_orphans(0).await.unwrap();
        assert_eq!(before, GcStats::default());

        let after = db.collect_orphans(now_millis() + 1).await.unwrap();
        assert_eq!(after.refs_removed, 1);
        assert_eq!(after.chunks_removed, 1);
        assert!(!db.chunk_exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn test_collect_orphans_drops_refs_metadata_does_not_list() {
        use crate::model::{ChunkPlacement, FileMetadata};

        let db = Database::in_memory();
        db.save_chunk(&chunk("listed", "f1", 0, b"l")).await.unwrap();
        db.save_chunk(&chunk("stale", "f1", 1, b"s")).await.unwrap();
        // Right chunk, wrong position
        db.save_chunk(&chunk("listed", "f1", 2, b"l")).await.unwrap();

        db.save_metadata(&FileMetadata {
            file_id: "f1".to_string(),
            filename: "f1".to_string(),
            path: "/f1".to_string(),
            size: 1,
            mime_type: None,
            created: 0,
            modified: 0,
            owner: "local".to_string(),
            permissions: None,
            chunks: vec![ChunkPlacement::local("listed".to_string(), false, "00".to_string())],
            redundancy_level: 1,
            encrypted: false,
            encryption_key_id: None,
        })
        .await
        .unwrap();

        let stats = db.collect_orphans(now_millis() + 1).await.unwrap();
        assert_eq!(stats.refs_removed, 2);
        assert_eq!(stats.chunks_removed, 1);

        let chunks = db.get_chunks_for_file("f1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].chunk_id.as_str(), chunks[0].index), ("listed", 0));
        assert!(!db.chunk_exists("stale").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_rejects_out_of_range_index() {
        let db = Database::in_memory();
        db.save_chunk(&chunk("h", "f1", 0, b"x")).await.unwrap();
        sqlx::query("UPDATE chunk_refs SET chunk_index = ? WHERE chunk_id = 'h'")
            .bind(i64::from(u32::MAX) + 1)
            .execute(db.pool().await.unwrap())
            .await
            .unwrap();

        let result = db.delete_chunks_for_file("f1").await;
        assert!(matches!(
            result,
            Err(StoreError::InvalidRow { table: "chunk_refs", .. })
        ));
        assert!(db.chunk_exists("h").await.unwrap());
    }
}
