//! Unified OpenAI-compatible generator.
//!
//! A single struct that handles chat completions for every provider in the
//! registry. Providers are distinguished only by endpoint URL, auth style, and
//! API key.

use async_trait::async_trait;
use nexus_core::config::GenerationConfig;
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::Generator;
use serde_json::{Value, json};

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// A generator that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleGenerator {
    /// Provider name (e.g., "gemini", "openai", "ollama").
    name: String,
    api_key: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    base_url: String,
    chat_path: String,
    auth_style: AuthStyle,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleGenerator {
    /// Create from a known provider config + generation settings.
    ///
    /// Resolution order:
    /// - API key: `config.api_key` > env vars > empty
    /// - Base URL: `config.endpoint` > env override > registry default
    pub fn from_registry(registry: &ProviderConfig, config: &GenerationConfig) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            registry
                .env_keys
                .iter()
                .find_map(|key| std::env::var(key).ok())
                .unwrap_or_default()
        };

        let base_url = if !config.endpoint.is_empty() {
            config.endpoint.trim_end_matches('/').to_string()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| {
                    let val = std::env::var(env_key).ok()?;
                    // OLLAMA_HOST is usually given without the /v1 suffix
                    if val.ends_with("/v1") {
                        Some(val)
                    } else {
                        Some(format!("{}/v1", val.trim_end_matches('/')))
                    }
                })
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        let model = if config.model.is_empty() {
            registry.default_model.to_string()
        } else {
            config.model.clone()
        };

        Ok(Self {
            name: registry.name.to_string(),
            api_key,
            base_url,
            chat_path: registry.chat_path.to_string(),
            auth_style: registry.auth_style,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: build_client(config)?,
        })
    }

    /// Create for a custom endpoint (e.g., "custom:https://my-server.com/v1").
    pub fn custom(endpoint: &str, config: &GenerationConfig) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();

        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };

        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Ok(Self {
            name: "custom".to_string(),
            api_key,
            base_url,
            chat_path: "/chat/completions".to_string(),
            auth_style,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: build_client(config)?,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        })
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }
}

fn build_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| NexusError::Http(format!("client build failed: {e}")))
}

/// Pull the assistant text out of a chat-completions response.
fn extract_content(json: &Value) -> Result<String> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| NexusError::Provider("No choices in response".into()))?;
    choice["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| NexusError::Provider("Empty message content".into()))
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.auth_style != AuthStyle::None && self.api_key.is_empty() {
            return Err(NexusError::ApiKeyMissing(self.name.clone()));
        }

        let url = format!("{}{}", self.base_url, self.chat_path);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt));
        let req = self.apply_auth(req);

        let resp = req.send().await.map_err(|e| {
            NexusError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(NexusError::Provider(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| NexusError::Http(e.to_string()))?;

        let content = extract_content(&json)?;
        tracing::debug!("🧠 {} generated {} chars", self.name, content.len());
        Ok(content)
    }
}
