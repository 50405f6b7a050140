use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::Row;

use super::database::{now_millis, Database};
use super::error::StoreResult;

impl Database {
    /// Store an arbitrary JSON-serializable value under `id`
    pub async fn save_config<T: Serialize + ?Sized>(&self, id: &str, value: &T) -> StoreResult<()> {
        let pool = self.pool().await?;
        let json = serde_json::to_string(value)?;

        sqlx::query(
            r#"
            INSERT INTO config (id, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(json)
        .bind(now_millis())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Store `value` only if nothing exists under `id` yet.
    ///
    /// Returns `true` if this call wrote the value.
    pub async fn save_config_if_absent<T: Serialize + ?Sized>(
        &self,
        id: &str,
        value: &T,
    ) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let json = serde_json::to_string(value)?;

        let result = sqlx::query(
            r#"
            INSERT INTO config (id, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(json)
        .bind(now_millis())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_config<T: DeserializeOwned>(&self, id: &str) -> StoreResult<Option<T>> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT value FROM config WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_config(&self, id: &str) -> StoreResult<bool> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM config WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
