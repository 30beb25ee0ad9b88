//! Cloud key-value sync against a hosted PostgREST `nexus_store` table.
//!
//! A missing table disables cloud sync for the rest of the process: every
//! `CloudStore` shares one offline flag, and once it is set all calls return
//! immediately.

use async_trait::async_trait;
use nexus_core::config::StorageConfig;
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::KeyValueStore;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const TABLE: &str = "nexus_store";

static CLOUD_OFFLINE: LazyLock<Arc<AtomicBool>> =
    LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// How a failed PostgREST response should be treated.
#[derive(Debug, Clone, PartialEq)]
pub enum CloudFailure {
    /// The table does not exist; go offline.
    MissingTable,
    /// No row for the key.
    NoRows,
    Other(String),
}

/// Classify a PostgREST error body.
pub fn classify_failure(status: u16, body: &str) -> CloudFailure {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = parsed["code"].as_str().unwrap_or_default();
    let message = parsed["message"].as_str().unwrap_or(body);

    if code == "42P01" || code == "PGRST205" || message.contains("Could not find the table") {
        return CloudFailure::MissingTable;
    }
    if code == "PGRST116" {
        return CloudFailure::NoRows;
    }
    CloudFailure::Other(format!("HTTP {status}: {message}"))
}

pub struct CloudStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    offline: Arc<AtomicBool>,
}

impl CloudStore {
    /// Build from storage config. Returns `None` when cloud sync is not configured.
    pub fn from_config(config: &StorageConfig) -> Result<Option<Self>> {
        let key = config.resolved_cloud_key();
        if config.cloud_url.is_empty() || key.is_empty() {
            return Ok(None);
        }
        Self::new(&config.cloud_url, &key).map(Some)
    }

    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Self::with_offline_flag(base_url, api_key, CLOUD_OFFLINE.clone())
    }

    /// Build with an explicit offline flag instead of the process-wide one.
    pub fn with_offline_flag(
        base_url: &str,
        api_key: &str,
        offline: Arc<AtomicBool>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NexusError::Storage(format!("client build failed: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            offline,
        })
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, TABLE)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn go_offline(&self) {
        if !self.offline.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "⚠️ Table '{}' not found. Disabling cloud sync for this session.",
                TABLE
            );
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<Value>> {
        let resp = self
            .authed(self.client.get(self.table_url()))
            .query(&[("id", format!("eq.{key}")), ("select", "data".to_string())])
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(|e| NexusError::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| NexusError::Http(e.to_string()))?;
        if status.is_success() {
            let row: Value = serde_json::from_str(&body)?;
            return Ok(row.get("data").cloned().filter(|v| !v.is_null()));
        }

        match classify_failure(status.as_u16(), &body) {
            CloudFailure::NoRows => Ok(None),
            CloudFailure::MissingTable => {
                self.go_offline();
                Ok(None)
            }
            CloudFailure::Other(msg) => Err(NexusError::Storage(msg)),
        }
    }

    async fn upsert(&self, key: &str, value: &Value) -> Result<()> {
        let resp = self
            .authed(self.client.post(self.table_url()))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({
                "id": key,
                "data": value,
                "updated_at": chrono::Utc::now().to_rfc3339(),
            }))
            .send()
            .await
            .map_err(|e| NexusError::Http(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        match classify_failure(status.as_u16(), &body) {
            CloudFailure::MissingTable => {
                self.go_offline();
                Ok(())
            }
            CloudFailure::NoRows => Ok(()),
            CloudFailure::Other(msg) => Err(NexusError::Storage(msg)),
        }
    }
}

#[async_trait]
impl KeyValueStore for CloudStore {
    fn name(&self) -> &str {
        "cloud"
    }

    async fn load(&self, key: &str) -> Option<Value> {
        if self.is_offline() {
            return None;
        }
        match self.fetch(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("❌ Cloud load error for key {}: {}", key, e);
                None
            }
        }
    }

    async fn save(&self, key: &str, value: &Value) {
        if self.is_offline() {
            return;
        }
        match self.upsert(key, value).await {
            Ok(()) if !self.is_offline() => tracing::debug!("☁️ Synced {}", key),
            Ok(()) => {}
            Err(e) => tracing::error!("❌ Cloud save error for key {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve_get(status: u16, body: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/nexus_store"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure(404, r#"{"code":"42P01","message":"relation does not exist"}"#),
            CloudFailure::MissingTable
        );
        assert_eq!(
            classify_failure(404, r#"{"code":"PGRST205","message":"x"}"#),
            CloudFailure::MissingTable
        );
        assert_eq!(
            classify_failure(404, "Could not find the table 'public.nexus_store'"),
            CloudFailure::MissingTable
        );
        assert_eq!(
            classify_failure(406, r#"{"code":"PGRST116","message":"0 rows"}"#),
            CloudFailure::NoRows
        );
        assert!(matches!(
            classify_failure(500, r#"{"code":"XX000","message":"boom"}"#),
            CloudFailure::Other(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_table_flips_offline() {
        let server = serve_get(
            404,
            json!({"code": "42P01", "message": "relation \"nexus_store\" does not exist"}),
        )
        .await;
        let flag = Arc::new(AtomicBool::new(false));
        let store = CloudStore::with_offline_flag(&server.uri(), "key", flag.clone()).unwrap();
        assert!(store.load("sdr_experiments").await.is_none());
        assert!(flag.load(Ordering::Relaxed));

        // A second store sharing the flag never touches the network.
        let quiet = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&quiet)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&quiet)
            .await;
        let other = CloudStore::with_offline_flag(&quiet.uri(), "key", flag).unwrap();
        other.save("k", &json!(1)).await;
        assert!(other.load("k").await.is_none());
    }

    #[tokio::test]
    async fn test_no_rows_is_none_and_stays_online() {
        let server = serve_get(
            406,
            json!({"code": "PGRST116", "message": "JSON object requested, multiple (or no) rows returned"}),
        )
        .await;
        let flag = Arc::new(AtomicBool::new(false));
        let store = CloudStore::with_offline_flag(&server.uri(), "key", flag.clone()).unwrap();
        assert!(store.load("missing").await.is_none());
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_load_returns_data_column() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/nexus_store"))
            .and(query_param("id", "eq.k"))
            .and(query_param("select", "data"))
            .and(header("apikey", "key"))
            .and(header("Authorization", "Bearer key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"exp": [1, 2]}})))
            .expect(1)
            .mount(&server)
            .await;
        let store =
            CloudStore::with_offline_flag(&server.uri(), "key", Arc::new(AtomicBool::new(false)))
                .unwrap();
        assert_eq!(store.load("k").await, Some(json!({"exp": [1, 2]})));
    }

    #[tokio::test]
    async fn test_save_upserts_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/nexus_store"))
            .and(header("Prefer", "resolution=merge-duplicates"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        let flag = Arc::new(AtomicBool::new(false));
        let store = CloudStore::with_offline_flag(&server.uri(), "key", flag.clone()).unwrap();
        store.save("k", &json!({"a": 1})).await;
        assert!(!flag.load(Ordering::Relaxed));

        let requests = server.received_requests().await.unwrap();
        let row: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(row["id"], "k");
        assert_eq!(row["data"], json!({"a": 1}));
        assert!(row["updated_at"].is_string());
    }

    #[test]
    fn test_from_config_requires_url_and_key() {
        let config = StorageConfig {
            cloud_key: "k".into(),
            ..StorageConfig::default()
        };
        assert!(CloudStore::from_config(&config).unwrap().is_none());
    }
}
