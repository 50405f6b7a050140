use sqlx::Row;

use super::database::{now_millis, Database};
use super::error::StoreResult;
use crate::model::FileMetadata;

impl Database {
    /// Insert or replace the metadata record for `metadata.file_id`.
    ///
    /// Last writer wins: there is no version check between concurrent
    /// writers of the same file.
    pub async fn save_metadata(&self, metadata: &FileMetadata) -> StoreResult<()> {
        let pool = self.pool().await?;
        let json = serde_json::to_string(metadata)?;

        sqlx::query(
            r#"
            INSERT INTO metadata (file_id, metadata, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&metadata.file_id)
        .bind(json)
        .bind(now_millis())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_metadata(&self, file_id: &str) -> StoreResult<Option<FileMetadata>> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT metadata FROM metadata WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.try_get("metadata")?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_metadata(&self, file_id: &str) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM metadata WHERE file_id = ?")
            .bind(file_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Every metadata record, ordered by file id
    pub async fn list_all_metadata(&self) -> StoreResult<Vec<FileMetadata>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT metadata FROM metadata ORDER BY file_id")
            .fetch_all(pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.try_get("metadata")?;
            records.push(serde_json::from_str(&json)?);
        }

        Ok(records)
    }

    pub async fn metadata_exists(&self, file_id: &str) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metadata WHERE file_id = ?")
            .bind(file_id)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }
}
