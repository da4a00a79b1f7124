//! # Local Database Module
//!
//! Durable key-value persistence for the sync engine. The engine only needs a
//! handful of named slots (`sync_queue`, `sync_settings`), so the platform
//! contract is the small [`KeyValueStore`] trait. [`LocalDatabase`] implements
//! it on SQLite.
//!
//! ## Key Components
//!
//! - `KeyValueStore`: async get/set/remove on named slots
//! - `LocalDatabase`: SQLite connection pool, schema and migrations
//! - `durable.rs`: [`DurableStore`], the queue/media persistence primitive
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldsync::client::local_db::{KeyValueStore, LocalDatabase};
//!
//! # async fn demo() -> fieldsync::shared::error::SyncResult<()> {
//! let db = LocalDatabase::open("/tmp/fieldsync/fieldsync.db").await?;
//! db.set("greeting", "hello").await?;
//! assert_eq!(db.get("greeting").await?.as_deref(), Some("hello"));
//! # Ok(())
//! # }
//! ```

pub mod durable;

pub use durable::DurableStore;

use crate::shared::error::SyncResult;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

/// Slot holding the serialized queue
pub const QUEUE_SLOT: &str = "sync_queue";
/// Slot holding the serialized settings
pub const SETTINGS_SLOT: &str = "sync_settings";

/// Durable key-value persistence provided by the platform
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> SyncResult<()>;

    async fn remove(&self, key: &str) -> SyncResult<()>;
}

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file
    ///
    /// Uses WAL mode so readers never block the writer.
    pub async fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA temp_store=MEMORY").execute(&pool).await?;

        let db = Self { pool };
        db.init_schema().await?;
        tracing::info!("[STORE] Opened local database at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database
    ///
    /// A single connection keeps every query on the same memory database.
    pub async fn in_memory() -> SyncResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> SyncResult<()> {
        sqlx::query(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;
        self.run_migrations().await
    }

    async fn run_migrations(&self) -> SyncResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if current_version.0 < 1 {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?)")
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KeyValueStore for LocalDatabase {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
