//! Volatile key-value backend, used in tests and when no database is available.

use async_trait::async_trait;
use nexus_core::traits::KeyValueStore;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    async fn save(&self, key: &str, value: &Value) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
    }
}
