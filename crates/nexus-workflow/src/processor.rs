//! Event trigger processor: the core control loop.
//!
//! ```text
//! Event
//!   → filter rules (event_type + condition), registry order
//!     → execute each action sequentially
//!       → failed action? record it as failed, keep going
//!   → ≥1 match: push one AutomationLog, notify subscribers
//!   → TriggerResult
//! ```

use crate::actions::{ActionExecutor, ActionOutcome};
use crate::log::{ActionStatus, AutomationLog, AutomationLogStore, LogStatus, WorkflowAction};
use crate::rules::{TriggerRule, default_rules};
use chrono::Utc;
use nexus_core::parse_model_json;
use nexus_core::types::{Event, OverridePriority, Prospect, SequenceAdaptation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Instant;

/// Per-call result of [`TriggerProcessor::process`].
#[derive(Debug, Clone, Serialize)]
pub struct TriggerResult {
    pub event: Event,
    pub actions_executed: Vec<ActionOutcome>,
    pub processing_time_ms: u64,
}

/// Decision returned by signal analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDecision {
    Accelerate,
    Pause,
    Pivot,
    Maintain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAnalysis {
    pub decision: SignalDecision,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub recommended_action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_draft: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_adjustment: Option<String>,
}

impl SignalAnalysis {
    fn maintain(reasoning: impl Into<String>) -> Self {
        Self {
            decision: SignalDecision::Maintain,
            confidence_score: 0.0,
            reasoning: reasoning.into(),
            recommended_action: "Continue existing sequence".into(),
            email_draft: None,
            strategy_adjustment: None,
        }
    }
}

pub struct TriggerProcessor {
    rules: Vec<TriggerRule>,
    executor: ActionExecutor,
    log: AutomationLogStore,
}

impl TriggerProcessor {
    /// Processor over the built-in rules with a private default log store.
    pub fn new(executor: ActionExecutor) -> Self {
        Self {
            rules: default_rules(),
            executor,
            log: AutomationLogStore::default(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<TriggerRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_log_store(mut self, log: AutomationLogStore) -> Self {
        self.log = log;
        self
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    pub fn log_store(&self) -> &AutomationLogStore {
        &self.log
    }

    pub async fn process(&self, event: &Event) -> TriggerResult {
        self.process_with(event, None).await
    }

    /// Process `event` against `rules`, or the processor's own rules when `None`.
    pub async fn process_with(&self, event: &Event, rules: Option<&[TriggerRule]>) -> TriggerResult {
        let started = Instant::now();
        let rules = rules.unwrap_or(self.rules.as_slice());

        let matching: Vec<&TriggerRule> = rules
            .iter()
            .filter(|r| r.matches(&event.event_type, &event.data))
            .collect();

        let mut actions_executed = Vec::with_capacity(matching.len());
        let mut workflow_actions = Vec::with_capacity(matching.len());

        for rule in &matching {
            tracing::info!(
                "⚡ Rule '{}' matched event '{}' for {}",
                rule.name,
                event.event_type,
                event.entity_name
            );
            let (outcome, status) = match self
                .executor
                .execute(&rule.action, event, &rule.parameters)
                .await
            {
                Ok(outcome) => (outcome, ActionStatus::Completed),
                Err(e) => {
                    tracing::error!("❌ Rule '{}' action {} failed: {}", rule.name, rule.action, e);
                    let outcome = ActionOutcome {
                        action: rule.action.to_string(),
                        result: json!({"status": "failed", "error": e.to_string()}),
                    };
                    (outcome, ActionStatus::Failed)
                }
            };

            workflow_actions.push(WorkflowAction {
                id: format!("act_{}", uuid::Uuid::new_v4().simple()),
                action_type: rule.action.as_str().to_uppercase(),
                description: format!(
                    "Rule '{}': {}",
                    rule.name,
                    rule.action.as_str().replace('_', " ")
                ),
                status,
                timestamp: Utc::now(),
                metadata: outcome.result.clone(),
            });
            actions_executed.push(outcome);
        }

        if !workflow_actions.is_empty() {
            self.log.push(AutomationLog {
                id: format!("wf_{}", uuid::Uuid::new_v4().simple()),
                trigger_type: event.event_type.clone(),
                entity_name: event.entity_name.clone(),
                timestamp: Utc::now(),
                status: LogStatus::from_actions(&workflow_actions),
                actions: workflow_actions,
            });
        } else {
            tracing::debug!("No rules matched event '{}'", event.event_type);
        }

        TriggerResult {
            event: event.clone(),
            actions_executed,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Legacy entry point: build an event from a trigger name and context.
    ///
    /// The entity id comes from `context.prospectId`, else a fresh
    /// `legacy_<id>`. `NEW_LEAD` defaults `source` to `"inbound"`.
    pub async fn trigger(&self, trigger_type: &str, entity_name: &str, context: Value) -> TriggerResult {
        let context = match context {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let entity_id = context
            .get("prospectId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("legacy_{}", uuid::Uuid::new_v4().simple()));

        let mut data = Map::new();
        if trigger_type == "NEW_LEAD" {
            data.insert("source".into(), json!("inbound"));
        }
        data.extend(context);

        let event = Event::new(trigger_type, entity_id, entity_name).with_data(Value::Object(data));
        self.process(&event).await
    }

    /// Ask the generation collaborator what a live market signal means for a
    /// prospect, apply the decision, and log it.
    pub async fn record_signal(
        &self,
        prospect: &Prospect,
        signal_type: &str,
        description: &str,
    ) -> SignalAnalysis {
        let memory = self.executor.memory();
        let current_strategy = memory
            .get(&prospect.id)
            .await
            .map(|m| m.next_action)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Standard Outreach".into());

        let prompt = signal_prompt(prospect, signal_type, description, &current_strategy);
        let analysis = match self.executor.generate(&prompt).await {
            Ok(text) => parse_model_json(&text)
                .and_then(|v| match serde_json::from_value::<SignalAnalysis>(v) {
                    Ok(a) => Some(a),
                    Err(e) => {
                        tracing::warn!("⚠️ Signal analysis has unexpected shape: {}", e);
                        None
                    }
                })
                .unwrap_or_else(|| SignalAnalysis::maintain("Analysis output was not usable")),
            Err(e) => {
                tracing::warn!("⚠️ Signal analysis unavailable: {}", e);
                SignalAnalysis::maintain(format!("Analysis unavailable: {e}"))
            }
        };

        if analysis.decision == SignalDecision::Accelerate {
            memory
                .update_adaptation(
                    &prospect.id,
                    SequenceAdaptation::new(format!("Signal: {signal_type}"))
                        .with_priority(OverridePriority::Urgent),
                )
                .await;
        }
        tracing::info!(
            "📡 Signal '{}' for {}: {:?}",
            signal_type,
            prospect.name,
            analysis.decision
        );

        let decision = serde_json::to_value(analysis.decision)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let action = WorkflowAction {
            id: format!("sig_{}", uuid::Uuid::new_v4().simple()),
            action_type: "SIGNAL_ANALYSIS".into(),
            description: format!("Decision: {decision}"),
            status: ActionStatus::Completed,
            timestamp: Utc::now(),
            metadata: serde_json::to_value(&analysis).unwrap_or(Value::Null),
        };
        self.log.push(AutomationLog {
            id: format!("wf_{}", uuid::Uuid::new_v4().simple()),
            trigger_type: "SIGNAL_DETECTED".into(),
            entity_name: prospect.name.clone(),
            timestamp: Utc::now(),
            status: LogStatus::Completed,
            actions: vec![action],
        });

        analysis
    }
}

fn signal_prompt(prospect: &Prospect, signal_type: &str, description: &str, context: &str) -> String {
    format!(
        "You are an autonomous signal analyst. Analyze this live market signal for prospect {name} at {company}.\n\n\
         SIGNAL DETECTED:\n\
         Type: {signal_type}\n\
         Description: {description}\n\n\
         CURRENT CONTEXT:\n\
         {context}\n\n\
         DECISION LOGIC:\n\
         - ACCELERATE: positive momentum (funding, promotion, hiring). Engage immediately.\n\
         - PAUSE: risk detected (layoffs, legal issue, PR scandal). Halt outreach.\n\
         - PIVOT: context shift (acquisition, strategy change). Switch to a consultative approach.\n\
         - MAINTAIN: low relevance or neutral. Continue the existing sequence.\n\n\
         Return JSON:\n\
         {{\n\
           \"decision\": \"ACCELERATE\" | \"PAUSE\" | \"PIVOT\" | \"MAINTAIN\",\n\
           \"confidence_score\": number (0-100),\n\
           \"reasoning\": \"string\",\n\
           \"recommended_action\": \"string\",\n\
           \"email_draft\": {{ \"subject\": \"string\", \"body\": \"string\" }} (only for ACCELERATE or PIVOT),\n\
           \"strategy_adjustment\": \"string\" (only for PIVOT)\n\
         }}",
        name = prospect.name,
        company = prospect.company,
    )
}
