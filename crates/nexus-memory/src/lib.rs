//! # Nexus Memory
//!
//! Key-value persistence backends and the prospect memory service.
//!
//! Backends all implement [`KeyValueStore`]: failures are logged and never
//! surfaced to callers.

pub mod cloud;
pub mod in_memory;
pub mod layered;
pub mod prospect;
pub mod sqlite;

pub use cloud::CloudStore;
pub use in_memory::InMemoryStore;
pub use layered::LayeredStore;
pub use prospect::ProspectMemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use nexus_core::config::{StorageConfig, expand_path};
use nexus_core::error::Result;
use nexus_core::traits::KeyValueStore;

/// Open the configured store: SQLite at `db_path`, with cloud sync layered on
/// top when a cloud URL and key are configured.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    let path = expand_path(&config.db_path);
    let local: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&path)?);
    tracing::debug!("💾 Opened store at {}", path.display());

    let cloud = CloudStore::from_config(config)?
        .map(|c| -> Arc<dyn KeyValueStore> { Arc::new(c) });
    if cloud.is_some() {
        tracing::info!("☁️ Cloud sync enabled: {}", config.cloud_url);
    }
    Ok(Arc::new(LayeredStore::new(local, cloud)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_open_store_local_only() {
        let path = std::env::temp_dir().join(format!("nexus_open_store_{}.db", std::process::id()));
        let config = StorageConfig {
            db_path: path.to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.name(), "layered");
        store.save("k", &json!({"v": true})).await;
        assert_eq!(store.load("k").await, Some(json!({"v": true})));
        let _ = std::fs::remove_file(&path);
    }
}
