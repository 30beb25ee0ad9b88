//! Nexus configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{NexusError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NexusConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

impl NexusConfig {
    /// Load config from the default path (~/.nexus/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NexusError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| NexusError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| NexusError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Nexus home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nexus")
    }
}

/// Expand `~` and environment variables in a configured path.
///
/// An undefined variable leaves the path as written (after `~` expansion).
pub fn expand_path(p: &str) -> PathBuf {
    let expanded = shellexpand::full(p)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(p).into_owned());
    PathBuf::from(expanded)
}

/// Generation (LLM) collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Empty means: resolve from the provider's env vars.
    #[serde(default)]
    pub api_key: String,
    /// Empty means: use the provider's registry default.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String { "gemini".into() }
fn default_model() -> String { "gemini-2.0-flash".into() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 1024 }
fn default_generation_timeout() -> u64 { 30 }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            endpoint: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Key-value persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Base URL of the hosted `nexus_store` table (REST). Empty disables cloud sync.
    #[serde(default)]
    pub cloud_url: String,
    #[serde(default)]
    pub cloud_key: String,
}

fn default_db_path() -> String { "~/.nexus/nexus.db".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cloud_url: String::new(),
            cloud_key: String::new(),
        }
    }
}

impl StorageConfig {
    /// Cloud key from config, falling back to `NEXUS_CLOUD_KEY`.
    pub fn resolved_cloud_key(&self) -> String {
        if !self.cloud_key.is_empty() {
            return self.cloud_key.clone();
        }
        std::env::var("NEXUS_CLOUD_KEY").unwrap_or_default()
    }
}

/// External sequence connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(default = "default_connector_url")]
    pub base_url: String,
    /// Empty means the simulated connector is used.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_connector_timeout")]
    pub timeout_secs: u64,
}

fn default_connector_url() -> String { "https://api.apollo.io".into() }
fn default_connector_timeout() -> u64 { 10 }

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_connector_url(),
            api_key: String::new(),
            timeout_secs: default_connector_timeout(),
        }
    }
}

/// Trigger processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
    /// Seller company name used in drafted messages.
    #[serde(default = "default_company_name")]
    pub company_name: String,
}

fn default_log_capacity() -> usize { 50 }
fn default_action_timeout() -> u64 { 45 }
fn default_company_name() -> String { "NEXUS Inc.".into() }

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            action_timeout_secs: default_action_timeout(),
            company_name: default_company_name(),
        }
    }
}

impl WorkflowConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

/// Send pacing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulingConfig {
    /// Offset of the local calendar used for business hours and weekdays.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NexusConfig::default();
        assert_eq!(config.generation.provider, "gemini");
        assert_eq!(config.workflow.log_capacity, 50);
        assert_eq!(config.workflow.company_name, "NEXUS Inc.");
        assert!((config.generation.temperature - 0.7).abs() < 0.01);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [generation]
            provider = "ollama"
            model = "llama3.2"
            timeout_secs = 5

            [workflow]
            log_capacity = 10

            [scheduling]
            utc_offset_minutes = -300
        "#;

        let config: NexusConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.generation.provider, "ollama");
        assert_eq!(config.generation.timeout(), Duration::from_secs(5));
        assert_eq!(config.workflow.log_capacity, 10);
        assert_eq!(config.workflow.company_name, "NEXUS Inc.");
        assert_eq!(config.scheduling.utc_offset_minutes, -300);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: NexusConfig = toml::from_str("").unwrap();
        assert_eq!(config.generation.provider, "gemini");
        assert_eq!(config.storage.db_path, "~/.nexus/nexus.db");
        assert!(config.connector.api_key.is_empty());
    }

    #[test]
    fn test_home_dir() {
        let home = NexusConfig::home_dir();
        assert!(home.to_string_lossy().contains(".nexus"));
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/x.db");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_expand_path_env_var() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_path("$HOME/x.db"), PathBuf::from(format!("{home}/x.db")));
        }
        assert_eq!(
            expand_path("$NEXUS_TEST_UNDEFINED_VAR/x.db"),
            PathBuf::from("$NEXUS_TEST_UNDEFINED_VAR/x.db")
        );
    }

    #[test]
    fn test_save_to_round_trip() {
        let dir = std::env::temp_dir().join(format!("nexus-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");
        let mut config = NexusConfig::default();
        config.workflow.company_name = "Acme".into();
        config.scheduling.utc_offset_minutes = 120;
        config.save_to(&path).unwrap();

        let loaded = NexusConfig::load_from(&path).unwrap();
        assert_eq!(loaded.workflow.company_name, "Acme");
        assert_eq!(loaded.scheduling.utc_offset_minutes, 120);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
