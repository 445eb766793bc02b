//! Key/value persistence
//!
//! Durable JSON values addressed by string keys. Each `set` replaces the
//! whole value, so a reader never observes a partially written snapshot.

use async_trait::async_trait;
use mcat_common::{Error, Result};
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Key of the catalog snapshot
pub const CATALOG_KEY: &str = "catalog";
/// Key of the quota ledger
pub const QUOTA_KEY: &str = "quota";

/// Generic async key/value store
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`; missing keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// SQLite-backed store (`kv_store` table)
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    db: Pool<Sqlite>,
}

impl SqliteKvStore {
    /// Wrap an existing pool, creating the table if needed
    pub async fn new(db: Pool<Sqlite>) -> Result<Self> {
        super::init_tables(&db).await?;
        Ok(Self { db })
    }

    /// Open the database file at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        let db = super::init_database_pool(db_path).await?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }
}

#[async_trait]
impl PersistenceAdapter for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .map_err(Error::Database)?;

        match row {
            Some((text,)) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(text)
        .bind(mcat_common::time::now().to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(Error::Database)?;

        tracing::trace!(key, "Persisted value");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral catalogs
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, Value>>,
    writes: AtomicU64,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a value without counting it as a write
    pub fn insert(&self, key: &str, value: Value) {
        self.lock().insert(key.to_string(), value);
    }

    /// Current value without going through the async API
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
