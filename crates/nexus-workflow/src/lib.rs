//! # Nexus Workflow
//!
//! Event-driven outreach automation.
//!
//! ## Architecture
//! ```text
//! Event (type + data)
//!   └── TriggerProcessor
//!         ├── TriggerRule: event type + Condition → ActionKind
//!         ├── ActionExecutor → prospect memory, sequence connector, generator
//!         └── AutomationLogStore (newest first, bounded) → subscribers
//!
//! SendScheduler: activities + constraints → hourly slots (one week lookahead)
//! ExperimentBook: A/B reply-rate tracking, z-test significance
//! analyze_timing: send-now / schedule-later / hold advice
//! ```

pub mod actions;
pub mod condition;
pub mod experiments;
pub mod log;
pub mod pacing;
pub mod processor;
pub mod rules;
pub mod timing;

pub use actions::{ActionExecutor, ActionKind, ActionOutcome};
pub use condition::{Condition, matches};
pub use experiments::{Experiment, ExperimentBook, VariantId, VariantStats, significance};
pub use log::{AutomationLog, AutomationLogStore, Subscription, WorkflowAction};
pub use pacing::{OptimizedSchedule, ScheduledActivity, SchedulingConstraints, SendScheduler};
pub use processor::{SignalAnalysis, SignalDecision, TriggerProcessor, TriggerResult};
pub use rules::{RuleDefinition, TriggerRule, default_rules, load_rules};
pub use timing::{SendAction, SendRecommendation, analyze_timing};
