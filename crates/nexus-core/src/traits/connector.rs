//! External sales-engagement connector (Apollo-style sequences).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Enrolls contacts in sequences hosted by an external system.
#[async_trait]
pub trait SequenceConnector: Send + Sync {
    /// Name of the external system, surfaced in action results.
    fn system(&self) -> &str;

    /// Add `contact_id` to `sequence_id`. The returned object is surfaced
    /// verbatim as the action result and carries at least `status`,
    /// `external_system`, `action_id` and `message`.
    async fn add_to_sequence(&self, contact_id: &str, sequence_id: &str) -> Result<Value>;
}
