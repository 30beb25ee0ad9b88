//! # Nexus Core
//!
//! Shared building blocks for the Nexus outreach automation engine:
//! domain types, the error type, configuration, and the traits behind which
//! external collaborators (generation API, key-value persistence, sequence
//! connector) sit.

pub mod config;
pub mod error;
pub mod json;
pub mod timeout;
pub mod traits;
pub mod types;

pub use config::NexusConfig;
pub use error::{NexusError, Result};
pub use json::parse_model_json;
pub use timeout::with_timeout;
pub use types::{Channel, Event, OverridePriority, Prospect, ProspectMemory, SequenceAdaptation};
