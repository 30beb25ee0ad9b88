//! Local store with optional cloud sync behind it.

use async_trait::async_trait;
use nexus_core::traits::KeyValueStore;
use serde_json::Value;
use std::sync::Arc;

/// Writes go local first, then cloud. Reads prefer local and backfill from cloud.
pub struct LayeredStore {
    local: Arc<dyn KeyValueStore>,
    cloud: Option<Arc<dyn KeyValueStore>>,
}

impl LayeredStore {
    pub fn new(local: Arc<dyn KeyValueStore>, cloud: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self { local, cloud }
    }
}

#[async_trait]
impl KeyValueStore for LayeredStore {
    fn name(&self) -> &str {
        "layered"
    }

    async fn load(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.local.load(key).await {
            return Some(value);
        }
        let cloud = self.cloud.as_ref()?;
        let value = cloud.load(key).await?;
        tracing::debug!("☁️ Backfilled {} from {}", key, cloud.name());
        self.local.save(key, &value).await;
        Some(value)
    }

    async fn save(&self, key: &str, value: &Value) {
        self.local.save(key, value).await;
        if let Some(cloud) = &self.cloud {
            cloud.save(key, value).await;
        }
    }
}
