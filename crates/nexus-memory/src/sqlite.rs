//! SQLite key-value backend: one JSON document per key in `nexus_store`.

use async_trait::async_trait;
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::KeyValueStore;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| NexusError::Storage(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    /// Store backed by a private in-process database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| NexusError::Storage(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nexus_store (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(|e| NexusError::Storage(format!("migrate: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read(&self, key: &str) -> Result<Option<Value>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| NexusError::Storage(e.to_string()))?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM nexus_store WHERE id = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| NexusError::Storage(e.to_string()))?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &Value) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| NexusError::Storage(e.to_string()))?;
        conn.execute(
            "INSERT INTO nexus_store (id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            rusqlite::params![key, value.to_string(), chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| NexusError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        let Ok(conn) = self.conn.lock() else {
            return 0;
        };
        conn.query_row("SELECT COUNT(*) FROM nexus_store", [], |r| r.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, key: &str) -> Option<Value> {
        match self.read(key) {
            Ok(value) => {
                tracing::debug!("💾 sqlite load {} ({})", key, if value.is_some() { "hit" } else { "miss" });
                value
            }
            Err(e) => {
                tracing::error!("❌ sqlite load failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn save(&self, key: &str, value: &Value) {
        match self.write(key, value) {
            Ok(()) => tracing::debug!("💾 sqlite saved {}", key),
            Err(e) => tracing::error!("❌ sqlite save failed for {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load("missing").await.is_none());
        store.save("k", &json!({"a": 1})).await;
        assert_eq!(store.load("k").await, Some(json!({"a": 1})));
        store.save("k", &json!([1, 2])).await;
        assert_eq!(store.load("k").await, Some(json!([1, 2])));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!(
            "nexus_store_test_{}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save("sdr_experiments", &json!([{"id": "exp-1"}])).await;
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.load("sdr_experiments").await,
            Some(json!([{"id": "exp-1"}]))
        );
        let _ = std::fs::remove_file(&path);
    }
}
