//! Generation collaborator: turns a prompt into model text.

use async_trait::async_trait;

use crate::error::Result;

/// A text-generation backend.
///
/// Implementations return the raw model text; callers that expect JSON run it
/// through [`parse_model_json`](crate::json::parse_model_json).
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Generate a completion for a single prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
