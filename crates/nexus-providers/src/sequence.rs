//! Sequence connectors: enroll a contact into an external outreach sequence.

use async_trait::async_trait;
use nexus_core::config::ConnectorConfig;
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::SequenceConnector;
use serde_json::{Value, json};

const SYSTEM_NAME: &str = "Apollo";

/// Talks to the Apollo REST API.
pub struct HttpSequenceConnector {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpSequenceConnector {
    pub fn new(config: &ConnectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NexusError::Connector(format!("client build failed: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn enroll_url(&self, sequence_id: &str) -> String {
        format!(
            "{}/v1/emailer_campaigns/{}/add_contact_ids",
            self.base_url, sequence_id
        )
    }
}

#[async_trait]
impl SequenceConnector for HttpSequenceConnector {
    fn system(&self) -> &str {
        SYSTEM_NAME
    }

    async fn add_to_sequence(&self, contact_id: &str, sequence_id: &str) -> Result<Value> {
        let url = self.enroll_url(sequence_id);
        tracing::info!("📤 Enrolling {} into {} sequence {}", contact_id, SYSTEM_NAME, sequence_id);

        let resp = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&json!({
                "emailer_campaign_id": sequence_id,
                "contact_ids": [contact_id],
            }))
            .send()
            .await
            .map_err(|e| NexusError::Connector(format!("{SYSTEM_NAME} request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(NexusError::Connector(format!(
                "{SYSTEM_NAME} API error {status}: {text}"
            )));
        }

        Ok(json!({
            "status": "success",
            "external_system": SYSTEM_NAME,
            "action_id": format!("apollo_{}", chrono::Utc::now().timestamp_millis()),
            "message": format!("Successfully added to sequence: {sequence_id}"),
        }))
    }
}

/// Offline stand-in used when no connector API key is configured.
#[derive(Debug, Default)]
pub struct SimulatedSequenceConnector;

#[async_trait]
impl SequenceConnector for SimulatedSequenceConnector {
    fn system(&self) -> &str {
        SYSTEM_NAME
    }

    async fn add_to_sequence(&self, contact_id: &str, sequence_id: &str) -> Result<Value> {
        tracing::info!(
            "🧪 Simulated {} enrollment: {} -> {}",
            SYSTEM_NAME,
            contact_id,
            sequence_id
        );
        Ok(json!({
            "status": "success",
            "external_system": SYSTEM_NAME,
            "action_id": format!("apollo_{}", chrono::Utc::now().timestamp_millis()),
            "message": format!("Successfully added to sequence: {sequence_id}"),
        }))
    }
}
