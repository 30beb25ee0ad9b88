//! Deadline wrapper for collaborator calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{NexusError, Result};

/// Run a collaborator call under a deadline. An elapsed deadline is reported
/// as [`NexusError::Timeout`], the same path as a rejected call.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("⏱️ {what} timed out after {limit:?}");
            Err(NexusError::Timeout(limit, what.to_string()))
        }
    }
}
