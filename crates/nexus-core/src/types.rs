//! Domain types shared by the workflow engine, memory and providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed, timestamped fact about something that happened to a prospect.
///
/// `event_type` is open-ended ("email_opened", "meeting_booked", ...).
/// `data` is the free-form payload trigger conditions are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityName")]
    pub entity_name: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Event {
    /// Create an event stamped with the current time and an empty payload.
    pub fn new(
        event_type: impl Into<String>,
        entity_id: impl Into<String>,
        entity_name: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            entity_id: entity_id.into(),
            entity_name: entity_name.into(),
            timestamp: Utc::now(),
            data: empty_object(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// The prospect this event concerns: `data.prospectId` when present,
    /// otherwise the entity id. `None` when both are empty.
    pub fn subject_id(&self) -> Option<&str> {
        self.data
            .get("prospectId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.entity_id.as_str()).filter(|s| !s.is_empty()))
    }
}

/// Outreach channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Linkedin,
    Sms,
    Call,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Linkedin => write!(f, "linkedin"),
            Channel::Sms => write!(f, "sms"),
            Channel::Call => write!(f, "call"),
        }
    }
}

/// Priority override set by escalation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverridePriority {
    Urgent,
    Normal,
}

/// Per-prospect override of the next outreach channel or priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceAdaptation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_next_channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_priority: Option<OverridePriority>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_until: Option<DateTime<Utc>>,
}

impl SequenceAdaptation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            override_next_channel: None,
            override_priority: None,
            reason: reason.into(),
            active_until: None,
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.override_next_channel = Some(channel);
        self
    }

    pub fn with_priority(mut self, priority: OverridePriority) -> Self {
        self.override_priority = Some(priority);
        self
    }

    /// Shallow merge: fields present in `update` overwrite, absent ones are kept.
    pub fn merge(&mut self, update: SequenceAdaptation) {
        if update.override_next_channel.is_some() {
            self.override_next_channel = update.override_next_channel;
        }
        if update.override_priority.is_some() {
            self.override_priority = update.override_priority;
        }
        if update.active_until.is_some() {
            self.active_until = update.active_until;
        }
        self.reason = update.reason;
    }
}

/// Direction of a recorded interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One touchpoint in a prospect's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub date: DateTime<Utc>,
    pub channel: String,
    pub direction: Direction,
    #[serde(default)]
    pub content_summary: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralProfile {
    pub disc_type: String,
    pub communication_preference: String,
    pub decision_style: String,
}

impl Default for BehavioralProfile {
    fn default() -> Self {
        Self {
            disc_type: "Unknown".into(),
            communication_preference: "Unknown".into(),
            decision_style: "Unknown".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedIntelligence {
    #[serde(default)]
    pub stated_pain_points: Vec<String>,
    #[serde(default)]
    pub stated_priorities: Vec<String>,
    #[serde(default)]
    pub mentioned_competitors: Vec<String>,
    #[serde(default)]
    pub budget_indicators: Vec<String>,
    #[serde(default)]
    pub timeline_indicators: Vec<String>,
    #[serde(default)]
    pub decision_makers_mentioned: Vec<String>,
    #[serde(default)]
    pub objections_raised: Vec<String>,
    #[serde(default)]
    pub questions_asked: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicLesson {
    #[serde(rename = "prospectId")]
    pub prospect_id: String,
    pub outcome: String,
    #[serde(rename = "keyLearning")]
    pub key_learning: String,
    pub timestamp: DateTime<Utc>,
}

/// Long-lived memory about a single prospect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectMemory {
    pub prospect_id: String,
    #[serde(default)]
    pub basic_info: Value,
    #[serde(default)]
    pub enrichment_data: Value,
    #[serde(default)]
    pub behavioral_profile: BehavioralProfile,
    #[serde(default)]
    pub interaction_history: Vec<InteractionEvent>,
    #[serde(default)]
    pub extracted_intelligence: ExtractedIntelligence,
    #[serde(default)]
    pub engagement_score: f64,
    #[serde(default)]
    pub lead_status: String,
    #[serde(default)]
    pub next_action: String,
    #[serde(default)]
    pub topics_to_avoid: Vec<String>,
    #[serde(default)]
    pub topics_that_resonated: Vec<String>,
    #[serde(default, rename = "episodicLessons")]
    pub episodic_lessons: Vec<EpisodicLesson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_adaptations: Option<SequenceAdaptation>,
}

impl ProspectMemory {
    /// Fresh memory for a prospect seen for the first time.
    pub fn new(prospect_id: impl Into<String>) -> Self {
        Self {
            prospect_id: prospect_id.into(),
            basic_info: empty_object(),
            enrichment_data: empty_object(),
            behavioral_profile: BehavioralProfile::default(),
            interaction_history: Vec::new(),
            extracted_intelligence: ExtractedIntelligence::default(),
            engagement_score: 0.0,
            lead_status: "cold".into(),
            next_action: "Initial Outreach".into(),
            topics_to_avoid: Vec::new(),
            topics_that_resonated: Vec::new(),
            episodic_lessons: Vec::new(),
            sequence_adaptations: Some(SequenceAdaptation::new("Initial State")),
        }
    }

    /// Most recent outbound touchpoint, if any.
    pub fn last_outbound(&self) -> Option<&InteractionEvent> {
        self.interaction_history
            .iter()
            .rev()
            .find(|i| i.direction == Direction::Outbound)
    }
}

/// A prospect as supplied by the caller's CRM view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub last_activity: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub funding: String,
    #[serde(default)]
    pub recent_news: String,
    #[serde(default)]
    pub engagement: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_deserializes_camel_case() {
        let event: Event = serde_json::from_value(json!({
            "type": "email_opened",
            "entityId": "p-1",
            "entityName": "Ada",
            "timestamp": "2026-03-02T08:00:00Z",
            "data": {"open_count": 3}
        }))
        .unwrap();
        assert_eq!(event.event_type, "email_opened");
        assert_eq!(event.entity_id, "p-1");
        assert_eq!(event.data["open_count"], 3);
    }

    #[test]
    fn test_subject_prefers_prospect_id() {
        let event = Event::new("x", "entity", "Ada").with_data(json!({"prospectId": "p-9"}));
        assert_eq!(event.subject_id(), Some("p-9"));
        let event = Event::new("x", "entity", "Ada");
        assert_eq!(event.subject_id(), Some("entity"));
        let event = Event::new("x", "", "Ada");
        assert_eq!(event.subject_id(), None);
    }

    #[test]
    fn test_adaptation_merge_is_shallow() {
        let mut current = SequenceAdaptation::new("first").with_priority(OverridePriority::Urgent);
        current.merge(SequenceAdaptation::new("second").with_channel(Channel::Linkedin));
        assert_eq!(current.override_priority, Some(OverridePriority::Urgent));
        assert_eq!(current.override_next_channel, Some(Channel::Linkedin));
        assert_eq!(current.reason, "second");
    }

    #[test]
    fn test_prospect_camel_case() {
        let p: Prospect = serde_json::from_value(json!({
            "id": "p-1",
            "name": "Ada",
            "recentNews": "Raised Series B",
            "lastActivity": "New Lead"
        }))
        .unwrap();
        assert_eq!(p.recent_news, "Raised Series B");
        assert_eq!(p.last_activity, "New Lead");
        assert!(p.technologies.is_empty());
    }

    #[test]
    fn test_memory_roundtrips_with_missing_fields() {
        let memory: ProspectMemory = serde_json::from_value(json!({"prospect_id": "p-1"})).unwrap();
        assert_eq!(memory.prospect_id, "p-1");
        assert!(memory.interaction_history.is_empty());
        assert!(memory.sequence_adaptations.is_none());
    }
}
