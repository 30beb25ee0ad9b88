//! # Nexus Providers
//!
//! Outbound collaborators for Nexus: text generation and sequence enrollment.
//!
//! All generation backends (Gemini, OpenAI, OpenRouter, Groq, Ollama) speak the
//! OpenAI chat-completions dialect and are handled by a single
//! `OpenAiCompatibleGenerator`.

pub mod openai_compatible;
pub mod provider_registry;
pub mod sequence;

use std::sync::Arc;

use nexus_core::config::{ConnectorConfig, NexusConfig};
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::{Generator, SequenceConnector};

/// Create a generator from configuration.
pub fn create_generator(config: &NexusConfig) -> Result<Box<dyn Generator>> {
    let provider_name = config.generation.provider.as_str();

    match provider_name {
        // Custom endpoint: "custom:https://my-server.com/v1"
        other if other.starts_with("custom:") => Ok(Box::new(
            openai_compatible::OpenAiCompatibleGenerator::custom(other, &config.generation)?,
        )),

        _ => {
            let registry = provider_registry::get_provider_config(provider_name)
                .ok_or_else(|| NexusError::ProviderNotFound(provider_name.into()))?;
            Ok(Box::new(
                openai_compatible::OpenAiCompatibleGenerator::from_registry(
                    registry,
                    &config.generation,
                )?,
            ))
        }
    }
}

/// Create the sequence connector. Without an API key the simulated connector is used.
pub fn create_connector(config: &ConnectorConfig) -> Result<Arc<dyn SequenceConnector>> {
    if config.api_key.is_empty() {
        tracing::info!("🧪 No connector API key configured, using simulated sequence connector");
        return Ok(Arc::new(sequence::SimulatedSequenceConnector));
    }
    Ok(Arc::new(sequence::HttpSequenceConnector::new(config)?))
}

/// List all available provider names.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = provider_registry::all_provider_names();
    names.push("custom");
    names
}
