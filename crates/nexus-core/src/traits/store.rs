//! Persistence collaborator: a durable key-value store.

use async_trait::async_trait;
use serde_json::Value;

/// Best-effort key-value persistence.
///
/// Both operations are fire-and-continue: implementations log failures and
/// never surface them to the caller. A missing key and a failed read both
/// load as `None`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self, key: &str) -> Option<Value>;

    async fn save(&self, key: &str, value: &Value);
}
