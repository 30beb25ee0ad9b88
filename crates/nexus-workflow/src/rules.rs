//! Trigger rule registry.
//!
//! Rules are data: an event type, a condition, and a named action with
//! parameters. They are loaded once and never mutated; callers may pass an
//! alternate list per call.

use crate::actions::ActionKind;
use crate::condition::Condition;
use nexus_core::error::{NexusError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

/// Rule in its stored/legacy shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub event_type: String,
    #[serde(default)]
    pub conditions: Value,
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
}

impl RuleDefinition {
    /// Validate and compile into an executable rule.
    pub fn compile(&self) -> Result<TriggerRule> {
        if self.name.trim().is_empty() {
            return Err(NexusError::invalid_rule("<unnamed>", "rule name is empty"));
        }
        if self.event_type.trim().is_empty() {
            return Err(NexusError::invalid_rule(&self.name, "event_type is empty"));
        }
        if self.action.trim().is_empty() {
            return Err(NexusError::invalid_rule(&self.name, "action is empty"));
        }
        Ok(TriggerRule {
            name: self.name.clone(),
            event_type: self.event_type.clone(),
            condition: Condition::compile(&self.name, &self.conditions)?,
            action: ActionKind::from_name(&self.action),
            parameters: if self.parameters.is_null() {
                json!({})
            } else {
                self.parameters.clone()
            },
            definition: self.clone(),
        })
    }
}

/// A compiled rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRule {
    pub name: String,
    pub event_type: String,
    pub condition: Condition,
    pub action: ActionKind,
    pub parameters: Value,
    /// Source the rule was compiled from.
    pub definition: RuleDefinition,
}

impl TriggerRule {
    /// Whether this rule fires for an event of `event_type` carrying `data`.
    pub fn matches(&self, event_type: &str, data: &Value) -> bool {
        self.event_type == event_type && self.condition.evaluate(data)
    }
}

/// Compile a list of definitions. Any invalid rule fails the whole load.
pub fn compile_rules(definitions: &[RuleDefinition]) -> Result<Vec<TriggerRule>> {
    definitions.iter().map(RuleDefinition::compile).collect()
}

/// Load and compile rules from a JSON file holding an array of definitions.
pub fn load_rules(path: &Path) -> Result<Vec<TriggerRule>> {
    let content = std::fs::read_to_string(path)?;
    let definitions: Vec<RuleDefinition> = serde_json::from_str(&content)?;
    let rules = compile_rules(&definitions)?;
    tracing::debug!("📜 Loaded {} rules from {}", rules.len(), path.display());
    Ok(rules)
}

/// The built-in rule set, in evaluation order.
pub fn default_definitions() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition {
            name: "channel_switch_on_engagement".into(),
            event_type: "email_opened".into(),
            conditions: json!({"open_count": {"$gte": 3}, "replied": false}),
            action: "switch_channel_linkedin".into(),
            parameters: json!({
                "reason": "High interest signal (opens) but no reply. Pattern interrupt required."
            }),
        },
        RuleDefinition {
            name: "high_intent_pricing_visit".into(),
            event_type: "website_visit".into(),
            conditions: json!({"page": "/pricing"}),
            action: "escalate_intent".into(),
            parameters: json!({"priority": "urgent", "tag": "high_intent"}),
        },
        RuleDefinition {
            name: "new_lead_enrichment".into(),
            event_type: "prospect_added".into(),
            conditions: json!({"source": {"$in": ["inbound", "import", "api"]}}),
            action: "enrich_and_sequence".into(),
            parameters: json!({
                "enrichment_depth": "comprehensive",
                "auto_sequence": true,
                "sequence_selection": "auto"
            }),
        },
        RuleDefinition {
            name: "meeting_booked_workflow".into(),
            event_type: "meeting_booked".into(),
            conditions: json!({}),
            action: "post_booking_workflow".into(),
            parameters: json!({
                "stop_sequence": true,
                "create_deal": true,
                "send_confirmation": true,
                "schedule_reminders": true,
                "generate_prep_doc": true
            }),
        },
        RuleDefinition {
            name: "job_change_outreach".into(),
            event_type: "prospect_job_changed".into(),
            conditions: json!({"new_company_icp_fit": true}),
            action: "job_change_campaign".into(),
            parameters: json!({"delay_days": 7, "personalization": "job_change_specific"}),
        },
        RuleDefinition {
            name: "funding_triggered_campaign".into(),
            event_type: "company_funding".into(),
            conditions: json!({"amount": {"$gte": 5_000_000}}),
            action: "funding_campaign".into(),
            parameters: json!({"priority": "high", "reference_funding": true}),
        },
        RuleDefinition {
            name: "no_reply_escalation".into(),
            event_type: "email_sent".into(),
            conditions: json!({"days_since_sent": {"$gte": 3}, "replied": false}),
            action: "add_to_apollo_sequence".into(),
            parameters: json!({
                "apolloSequenceId": "seq_linkedin_bump_v2",
                "reason": "No reply to email channel."
            }),
        },
    ]
}

/// The built-in rule set, compiled.
pub fn default_rules() -> Vec<TriggerRule> {
    default_definitions()
        .iter()
        .filter_map(|d| match d.compile() {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::error!("❌ Built-in rule rejected: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_all_compile() {
        assert_eq!(default_rules().len(), default_definitions().len());
        assert!(compile_rules(&default_definitions()).is_ok());
    }

    #[test]
    fn test_default_rule_order_and_actions() {
        let rules = default_rules();
        assert_eq!(rules[0].name, "channel_switch_on_engagement");
        assert_eq!(rules[0].action, ActionKind::SwitchChannelLinkedin);
        assert_eq!(rules[6].action, ActionKind::AddToExternalSequence);
    }

    #[test]
    fn test_meeting_booked_always_matches() {
        let rules = default_rules();
        let rule = rules.iter().find(|r| r.event_type == "meeting_booked").unwrap();
        assert!(rule.matches("meeting_booked", &Value::Null));
        assert!(!rule.matches("email_opened", &Value::Null));
    }

    #[test]
    fn test_funding_threshold() {
        let rules = default_rules();
        let rule = rules.iter().find(|r| r.name == "funding_triggered_campaign").unwrap();
        assert!(rule.matches("company_funding", &json!({"amount": 5_000_000})));
        assert!(!rule.matches("company_funding", &json!({"amount": 4_999_999})));
    }

    #[test]
    fn test_invalid_definitions_fail_load() {
        let bad = RuleDefinition {
            name: "bad".into(),
            event_type: "x".into(),
            conditions: json!({"n": {"$regex": "a"}}),
            action: "escalate_intent".into(),
            parameters: Value::Null,
        };
        let err = compile_rules(&[default_definitions()[0].clone(), bad]).unwrap_err();
        assert!(matches!(err, NexusError::InvalidRule { ref rule, .. } if rule == "bad"));

        let unnamed = RuleDefinition {
            name: " ".into(),
            ..default_definitions()[0].clone()
        };
        assert!(unnamed.compile().is_err());
    }

    #[test]
    fn test_load_rules_from_file() {
        let path = std::env::temp_dir().join(format!("nexus_rules_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"name":"r1","event_type":"demo","action":"accelerate_sequence"}]"#,
        )
        .unwrap();
        let rules = load_rules(&path).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].condition, Condition::always());
        assert_eq!(rules[0].parameters, json!({}));
        let _ = std::fs::remove_file(&path);
    }
}
