use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::error::{StoreError, StoreResult};

/// Version written to `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS chunks (
        chunk_id TEXT PRIMARY KEY,
        data BLOB NOT NULL,
        size INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunk_refs (
        chunk_id TEXT NOT NULL,
        file_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (file_id, chunk_index, chunk_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chunk_refs_file ON chunk_refs(file_id)",
    "CREATE INDEX IF NOT EXISTS idx_chunk_refs_chunk ON chunk_refs(chunk_id)",
    r#"
    CREATE TABLE IF NOT EXISTS metadata (
        file_id TEXT PRIMARY KEY,
        metadata TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS config (
        id TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
];

struct DatabaseInner {
    url: String,
    pool: OnceCell<SqlitePool>,
    opens: AtomicUsize,
}

/// Handle to the local store.
///
/// Cloning is cheap and every clone shares one pool. Nothing touches the
/// disk until the first operation; concurrent first operations wait on
/// the same initialization.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                url: url.into(),
                pool: OnceCell::new(),
                opens: AtomicUsize::new(0),
            }),
        }
    }

    /// Private in-memory database (for testing)
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    /// Database file at `path`, created if missing
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self::new(format!("sqlite://{}", path.as_ref().display()))
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Shared pool, opening and migrating the database on first use
    pub async fn pool(&self) -> StoreResult<&SqlitePool> {
        self.inner.pool.get_or_try_init(|| self.open()).await
    }

    async fn open(&self) -> StoreResult<SqlitePool> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        let url = &self.inner.url;
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives only as long as its one connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        Self::migrate(&pool).await?;

        tracing::info!(url = %url, version = SCHEMA_VERSION, "Opened chunk database");
        Ok(pool)
    }

    /// Create missing tables without touching existing rows
    async fn migrate(pool: &SqlitePool) -> StoreResult<()> {
        let found: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool)
            .await?;

        if found > SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        let mut tx = pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }
        if found < SCHEMA_VERSION {
            let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
            sqlx::query(&pragma).execute(&mut *tx).await?;
            tracing::debug!(from = found, to = SCHEMA_VERSION, "Upgraded database schema");
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn schema_version(&self) -> StoreResult<i64> {
        let pool = self.pool().await?;
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool)
            .await?;
        Ok(version)
    }

    /// How many times the underlying store has been opened
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Close the pool if it was ever opened
    pub async fn close(&self) {
        if let Some(pool) = self.inner.pool.get() {
            pool.close().await;
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
