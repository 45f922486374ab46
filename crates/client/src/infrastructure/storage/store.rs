//! SQLite-backed document store.
//!
//! Documents are keyed by `(store, key)` inside one table. Writes default
//! to a coalescing window (one transaction per store per flush) with an
//! `immediate` bypass; `flush_all` runs on shutdown so no pending write is
//! lost. Every operation tolerates a broken database: `set` returns
//! `false`, `get` returns the caller's default, and the rest of the
//! system proceeds without persistence.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

type PendingWrites = BTreeMap<(String, String), Option<String>>;

pub struct DocumentStore {
    pool: SqlitePool,
    pending: Arc<Mutex<PendingWrites>>,
    flush_window: Duration,
    flush_scheduled: Arc<AtomicBool>,
}

impl DocumentStore {
    pub async fn new(pool: SqlitePool, flush_window: Duration) -> Result<Self, StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                store TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (store, key)
            )
        "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            pending: Arc::new(Mutex::new(BTreeMap::new())),
            flush_window,
            flush_scheduled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn open_at(path: &Path, flush_window: Duration) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::new(pool, flush_window).await
    }

    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::new(pool, Duration::from_millis(50)).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Raw read. Pending (not yet flushed) writes win over the database.
    pub async fn get(&self, key: &str, store: &str) -> Option<String> {
        if let Ok(pending) = self.pending.lock() {
            if let Some(entry) = pending.get(&(store.to_string(), key.to_string())) {
                return entry.clone();
            }
        }

        let row: Result<Option<(String,)>, sqlx::Error> =
            sqlx::query_as("SELECT value FROM documents WHERE store = ? AND key = ?")
                .bind(store)
                .bind(key)
                .fetch_optional(&self.pool)
                .await;
        match row {
            Ok(found) => found.map(|(value,)| value),
            Err(e) => {
                tracing::warn!(store, key, "storage read failed: {e}");
                None
            }
        }
    }

    pub async fn get_or(&self, key: &str, store: &str, default: &str) -> String {
        self.get(key, store)
            .await
            .unwrap_or_else(|| default.to_string())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str, store: &str) -> Option<T> {
        let text = self.get(key, store).await?;
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(store, key, "stored document failed to parse: {e}");
                None
            }
        }
    }

    /// All keys currently present in a store, pending writes included.
    pub async fn keys_in_store(&self, store: &str) -> Vec<String> {
        let mut keys: Vec<String> = match sqlx::query_as::<_, (String,)>(
            "SELECT key FROM documents WHERE store = ? ORDER BY key",
        )
        .bind(store)
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => rows.into_iter().map(|(key,)| key).collect(),
            Err(e) => {
                tracing::warn!(store, "storage key listing failed: {e}");
                Vec::new()
            }
        };
        if let Ok(pending) = self.pending.lock() {
            for ((pending_store, key), value) in pending.iter() {
                if pending_store == store {
                    match value {
                        Some(_) if !keys.contains(key) => keys.push(key.clone()),
                        None => keys.retain(|k| k != key),
                        _ => {}
                    }
                }
            }
        }
        keys.sort();
        keys
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Write a document. `immediate: true` flushes before returning;
    /// `false` coalesces into the current window.
    pub async fn set(&self, key: &str, value: &str, store: &str, immediate: bool) -> bool {
        if !self.set_deferred(key, value, store) {
            return false;
        }
        if immediate {
            return self.flush_all().await;
        }
        true
    }

    /// Coalesced write; safe to call from synchronous event handlers. The
    /// flush task runs one transaction per store after the window closes.
    pub fn set_deferred(&self, key: &str, value: &str, store: &str) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        pending.insert(
            (store.to_string(), key.to_string()),
            Some(value.to_string()),
        );
        drop(pending);
        self.schedule_flush();
        true
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        store: &str,
        immediate: bool,
    ) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.set(key, &text, store, immediate).await,
            Err(e) => {
                tracing::warn!(store, key, "document serialization failed: {e}");
                false
            }
        }
    }

    pub fn set_json_deferred<T: Serialize>(&self, key: &str, value: &T, store: &str) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.set_deferred(key, &text, store),
            Err(e) => {
                tracing::warn!(store, key, "document serialization failed: {e}");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str, store: &str) -> bool {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert((store.to_string(), key.to_string()), None);
        } else {
            return false;
        }
        self.flush_all().await
    }

    fn schedule_flush(&self) {
        if self.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let pool = self.pool.clone();
        let pending = Arc::clone(&self.pending);
        let scheduled = Arc::clone(&self.flush_scheduled);
        let window = self.flush_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            scheduled.store(false, Ordering::SeqCst);
            let drained = match pending.lock() {
                Ok(mut p) => std::mem::take(&mut *p),
                Err(_) => return,
            };
            if let Err(e) = Self::write_batch(&pool, drained).await {
                tracing::warn!("coalesced flush failed: {e}");
            }
        });
    }

    /// Flush every pending write. Called on shutdown so nothing is lost.
    pub async fn flush_all(&self) -> bool {
        let drained = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return false,
        };
        if drained.is_empty() {
            return true;
        }
        match Self::write_batch(&self.pool, drained).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("storage flush failed: {e}");
                false
            }
        }
    }

    /// Flush and close the underlying pool. Used on shutdown and when a
    /// store handle must release its database file.
    pub async fn close(&self) {
        self.flush_all().await;
        self.pool.close().await;
    }

    async fn write_batch(pool: &SqlitePool, batch: PendingWrites) -> Result<(), StorageError> {
        // One transaction per store.
        let mut by_store: BTreeMap<String, Vec<(String, Option<String>)>> = BTreeMap::new();
        for ((store, key), value) in batch {
            by_store.entry(store).or_default().push((key, value));
        }

        for (store, entries) in by_store {
            let mut tx = pool.begin().await?;
            for (key, value) in entries {
                match value {
                    Some(value) => {
                        sqlx::query(
                            "INSERT OR REPLACE INTO documents (store, key, value, updated_at) \
                             VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
                        )
                        .bind(&store)
                        .bind(&key)
                        .bind(&value)
                        .execute(&mut *tx)
                        .await?;
                    }
                    None => {
                        sqlx::query("DELETE FROM documents WHERE store = ? AND key = ?")
                            .bind(&store)
                            .bind(&key)
                            .execute(&mut *tx)
                            .await?;
                    }
                }
            }
            tx.commit().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::keys;

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let store = DocumentStore::open_in_memory().await.expect("open");
        assert!(store.set("k", "v", keys::SETTINGS, true).await);
        assert_eq!(store.get("k", keys::SETTINGS).await.as_deref(), Some("v"));
        assert_eq!(store.get("k", keys::COMBAT_STATS).await, None);
    }

    #[tokio::test]
    async fn test_deferred_write_visible_before_flush() {
        let store = DocumentStore::open_in_memory().await.expect("open");
        assert!(store.set_deferred("k", "v", keys::SETTINGS));
        // Pending write wins even though the flush window has not closed.
        assert_eq!(store.get("k", keys::SETTINGS).await.as_deref(), Some("v"));
        assert!(store.flush_all().await);
        assert_eq!(store.get("k", keys::SETTINGS).await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_coalesced_writes_last_wins() {
        let store = DocumentStore::open_in_memory().await.expect("open");
        store.set_deferred("k", "first", keys::SETTINGS);
        store.set_deferred("k", "second", keys::SETTINGS);
        store.flush_all().await;
        assert_eq!(
            store.get("k", keys::SETTINGS).await.as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_delete_removes_document() {
        let store = DocumentStore::open_in_memory().await.expect("open");
        store.set("k", "v", keys::SETTINGS, true).await;
        assert!(store.delete("k", keys::SETTINGS).await);
        assert_eq!(store.get("k", keys::SETTINGS).await, None);
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let store = DocumentStore::open_in_memory().await.expect("open");
        let value = vec!["a".to_string(), "b".to_string()];
        assert!(store.set_json("list", &value, keys::SETTINGS, true).await);
        let back: Vec<String> = store
            .get_json("list", keys::SETTINGS)
            .await
            .expect("parse back");
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn test_keys_in_store_merges_pending() {
        let store = DocumentStore::open_in_memory().await.expect("open");
        store.set("a", "1", keys::SETTINGS, true).await;
        store.set_deferred("b", "2", keys::SETTINGS);
        let keys_listed = store.keys_in_store(keys::SETTINGS).await;
        assert_eq!(keys_listed, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_on_disk_reopen_preserves_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("toolasha.db");
        {
            let store = DocumentStore::open_at(&path, Duration::from_millis(50))
                .await
                .expect("open");
            assert!(store.set("k", "v", keys::SETTINGS, true).await);
            store.close().await;
        }
        let store = DocumentStore::open_at(&path, Duration::from_millis(50))
            .await
            .expect("reopen");
        assert_eq!(store.get("k", keys::SETTINGS).await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_scheduled_flush_fires() {
        let store = DocumentStore::open_in_memory().await.expect("open");
        store.set_deferred("k", "v", keys::SETTINGS);
        tokio::time::sleep(Duration::from_millis(150)).await;
        // Pending map is drained; value must now come from the database.
        assert!(store
            .pending
            .lock()
            .map(|p| p.is_empty())
            .unwrap_or(false));
        assert_eq!(store.get("k", keys::SETTINGS).await.as_deref(), Some("v"));
    }
}
