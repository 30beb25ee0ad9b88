//! Action executor: performs one rule's side effect and reports the outcome.
//!
//! Every action is at-most-once per call: no retry, no rollback. Collaborator
//! calls go through [`with_timeout`], so a hung collaborator surfaces as a
//! [`NexusError::Timeout`] instead of stalling the event.

use nexus_core::error::{NexusError, Result};
use nexus_core::traits::{Generator, SequenceConnector};
use nexus_core::types::{Channel, Event, OverridePriority, SequenceAdaptation};
use nexus_core::{parse_model_json, with_timeout};
use nexus_memory::ProspectMemoryStore;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Named action a rule can bind to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SwitchChannelLinkedin,
    EscalateIntent,
    EnrichAndSequence,
    AccelerateSequence,
    PriorityOutreach,
    PostBookingWorkflow,
    FundingCampaign,
    /// `add_to_apollo_sequence`: enroll the subject in an external sequence.
    AddToExternalSequence,
    JobChangeCampaign,
    /// Action name this build does not know. Executes as `unknown_action`.
    Custom(String),
}

impl ActionKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "switch_channel_linkedin" => Self::SwitchChannelLinkedin,
            "escalate_intent" => Self::EscalateIntent,
            "enrich_and_sequence" => Self::EnrichAndSequence,
            "accelerate_sequence" => Self::AccelerateSequence,
            "priority_outreach" => Self::PriorityOutreach,
            "post_booking_workflow" => Self::PostBookingWorkflow,
            "funding_campaign" => Self::FundingCampaign,
            "add_to_apollo_sequence" => Self::AddToExternalSequence,
            "job_change_campaign" => Self::JobChangeCampaign,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SwitchChannelLinkedin => "switch_channel_linkedin",
            Self::EscalateIntent => "escalate_intent",
            Self::EnrichAndSequence => "enrich_and_sequence",
            Self::AccelerateSequence => "accelerate_sequence",
            Self::PriorityOutreach => "priority_outreach",
            Self::PostBookingWorkflow => "post_booking_workflow",
            Self::FundingCampaign => "funding_campaign",
            Self::AddToExternalSequence => "add_to_apollo_sequence",
            Self::JobChangeCampaign => "job_change_campaign",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one action did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub action: String,
    pub result: Value,
}

pub struct ActionExecutor {
    memory: Arc<ProspectMemoryStore>,
    connector: Arc<dyn SequenceConnector>,
    generator: Option<Arc<dyn Generator>>,
    timeout: Duration,
    company_name: String,
}

impl ActionExecutor {
    pub fn new(memory: Arc<ProspectMemoryStore>, connector: Arc<dyn SequenceConnector>) -> Self {
        Self {
            memory,
            connector,
            generator: None,
            timeout: Duration::from_secs(45),
            company_name: "NEXUS Inc.".into(),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Upper bound for each collaborator call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Seller company named in drafted messages.
    pub fn with_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = name.into();
        self
    }

    pub fn memory(&self) -> &Arc<ProspectMemoryStore> {
        &self.memory
    }

    /// Run `action` for `event`. Errors are returned only for failures the
    /// action itself does not degrade (the caller records them as failed).
    pub async fn execute(
        &self,
        action: &ActionKind,
        event: &Event,
        params: &Value,
    ) -> Result<ActionOutcome> {
        tracing::info!("🎬 Executing action {} for {}", action, event.entity_name);
        let subject = event.subject_id();

        let result = match action {
            ActionKind::SwitchChannelLinkedin => match subject {
                Some(id) => {
                    let reason = params
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or("Engagement Based Switch");
                    self.memory
                        .update_adaptation(
                            id,
                            SequenceAdaptation::new(reason).with_channel(Channel::Linkedin),
                        )
                        .await;
                    json!({"status": "sequence_branched", "next_channel": "linkedin"})
                }
                None => completed(),
            },
            ActionKind::EscalateIntent => match subject {
                Some(id) => {
                    self.memory
                        .update_adaptation(
                            id,
                            SequenceAdaptation::new("High Intent Signal (Pricing Page)")
                                .with_priority(OverridePriority::Urgent),
                        )
                        .await;
                    json!({"status": "escalated", "priority": "urgent"})
                }
                None => completed(),
            },
            ActionKind::EnrichAndSequence => json!({"status": "enrolled", "enriched": true}),
            ActionKind::AccelerateSequence => {
                json!({"status": "accelerated", "step_skipped": true})
            }
            ActionKind::PriorityOutreach
            | ActionKind::PostBookingWorkflow
            | ActionKind::FundingCampaign => completed(),
            ActionKind::AddToExternalSequence => self.add_to_sequence(subject, params).await?,
            ActionKind::JobChangeCampaign => self.job_change_campaign(event).await,
            ActionKind::Custom(name) => {
                tracing::warn!("⚠️ Unknown action: {}", name);
                json!({"status": "unknown_action"})
            }
        };

        Ok(ActionOutcome {
            action: action.to_string(),
            result,
        })
    }

    async fn add_to_sequence(&self, subject: Option<&str>, params: &Value) -> Result<Value> {
        let contact_id = subject
            .ok_or_else(|| NexusError::Connector("event has no subject to enroll".into()))?;
        let sequence_id = params
            .get("apolloSequenceId")
            .and_then(Value::as_str)
            .ok_or_else(|| NexusError::Connector("missing apolloSequenceId parameter".into()))?;

        with_timeout(
            self.timeout,
            self.connector.system(),
            self.connector.add_to_sequence(contact_id, sequence_id),
        )
        .await
    }

    /// Drafts a re-engagement email. Every failure degrades to `{status: failed}`.
    async fn job_change_campaign(&self, event: &Event) -> Value {
        let field = |name: &str| {
            event
                .data
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };
        let (Some(name), Some(old_company), Some(new_company), Some(new_title)) = (
            field("prospectName"),
            field("oldCompany"),
            field("newCompany"),
            field("newTitle"),
        ) else {
            return completed();
        };

        let prompt = job_change_prompt(name, old_company, new_company, new_title, &self.company_name);
        match self.generate(&prompt).await {
            Ok(text) => json!({
                "status": "draft_created",
                "draft": parse_model_json(&text).unwrap_or(Value::Null),
                "campaign_status": "ready_to_send",
            }),
            Err(e) => {
                tracing::warn!("⚠️ Job change draft failed: {}", e);
                json!({"status": "failed"})
            }
        }
    }

    /// Call the generation collaborator under the configured timeout.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| NexusError::Provider("no generator configured".into()))?;
        with_timeout(self.timeout, generator.name(), generator.generate(prompt)).await
    }
}

fn completed() -> Value {
    json!({"status": "completed"})
}

fn job_change_prompt(
    prospect: &str,
    old_company: &str,
    new_company: &str,
    new_title: &str,
    my_company: &str,
) -> String {
    format!(
        "Write a \"Job Change\" re-engagement email for {prospect}.\n\n\
         Context:\n\
         - They were a champion at {old_company}.\n\
         - They just moved to {new_company} as {new_title}.\n\
         - My Company: {my_company}.\n\n\
         Strategy:\n\
         - Tone: warm, celebratory, professional.\n\
         - Hook: congratulate them on the specific move.\n\
         - Bridge: reference what they accomplished at {old_company}.\n\
         - Ask: a low-friction \"let's reconnect\" or \"is this relevant to your new stack?\".\n\n\
         Return JSON: {{ \"subject\": \"string\", \"body\": \"string\" }}"
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use nexus_core::types::Prospect;
    use nexus_memory::InMemoryStore;
    use std::sync::Mutex;

    /// Generator returning a canned reply, or failing.
    pub(crate) struct FakeGenerator {
        pub reply: Option<String>,
        pub delay: Duration,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FakeGenerator {
        pub fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.into()),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        fn name(&self) -> &str {
            "fake"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            tokio::time::sleep(self.delay).await;
            self.reply
                .clone()
                .ok_or_else(|| NexusError::Provider("fake outage".into()))
        }
    }

    /// Connector recording enrollments, optionally failing.
    #[derive(Default)]
    pub(crate) struct FakeConnector {
        pub fail: bool,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SequenceConnector for FakeConnector {
        fn system(&self) -> &str {
            "Apollo"
        }

        async fn add_to_sequence(&self, contact_id: &str, sequence_id: &str) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((contact_id.into(), sequence_id.into()));
            if self.fail {
                return Err(NexusError::Connector("503 from Apollo".into()));
            }
            Ok(json!({
                "status": "success",
                "external_system": "Apollo",
                "action_id": "apollo_1",
                "message": format!("Successfully added to sequence: {sequence_id}"),
            }))
        }
    }

    pub(crate) fn memory_store() -> Arc<ProspectMemoryStore> {
        Arc::new(ProspectMemoryStore::new(Arc::new(InMemoryStore::new())))
    }

    fn executor() -> (ActionExecutor, Arc<ProspectMemoryStore>, Arc<FakeConnector>) {
        let memory = memory_store();
        let connector = Arc::new(FakeConnector::default());
        (
            ActionExecutor::new(memory.clone(), connector.clone()),
            memory,
            connector,
        )
    }

    fn job_change_event() -> Event {
        Event::new("prospect_job_changed", "p-1", "Ada").with_data(json!({
            "prospectName": "Ada",
            "oldCompany": "Initech",
            "newCompany": "Globex",
            "newTitle": "VP Sales",
            "new_company_icp_fit": true
        }))
    }

    #[test]
    fn test_action_kind_names_roundtrip() {
        for name in [
            "switch_channel_linkedin",
            "escalate_intent",
            "add_to_apollo_sequence",
            "job_change_campaign",
            "send_gift_basket",
        ] {
            assert_eq!(ActionKind::from_name(name).as_str(), name);
        }
        assert_eq!(
            ActionKind::from_name("send_gift_basket"),
            ActionKind::Custom("send_gift_basket".into())
        );
    }

    #[tokio::test]
    async fn test_switch_channel_updates_memory() {
        let (exec, memory, _) = executor();
        memory
            .initialize(&Prospect {
                id: "p-1".into(),
                ..Prospect::default()
            })
            .await;
        let event = Event::new("email_opened", "p-1", "Ada");
        let outcome = exec
            .execute(
                &ActionKind::SwitchChannelLinkedin,
                &event,
                &json!({"reason": "Pattern interrupt"}),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome.result,
            json!({"status": "sequence_branched", "next_channel": "linkedin"})
        );
        let adaptation = memory.get("p-1").await.unwrap().sequence_adaptations.unwrap();
        assert_eq!(adaptation.override_next_channel, Some(Channel::Linkedin));
        assert_eq!(adaptation.reason, "Pattern interrupt");
    }

    #[tokio::test]
    async fn test_escalate_uses_prospect_id_from_data() {
        let (exec, memory, _) = executor();
        memory
            .initialize(&Prospect {
                id: "p-7".into(),
                ..Prospect::default()
            })
            .await;
        let event =
            Event::new("website_visit", "visitor", "Ada").with_data(json!({"prospectId": "p-7"}));
        let outcome = exec
            .execute(&ActionKind::EscalateIntent, &event, &json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.result["status"], "escalated");
        let adaptation = memory.get("p-7").await.unwrap().sequence_adaptations.unwrap();
        assert_eq!(adaptation.override_priority, Some(OverridePriority::Urgent));
    }

    #[tokio::test]
    async fn test_static_results() {
        let (exec, _, _) = executor();
        let event = Event::new("x", "p-1", "Ada");
        let run = |kind: ActionKind| {
            let exec = &exec;
            let event = &event;
            async move { exec.execute(&kind, event, &json!({})).await.unwrap().result }
        };
        assert_eq!(run(ActionKind::EnrichAndSequence).await["status"], "enrolled");
        assert_eq!(run(ActionKind::AccelerateSequence).await["step_skipped"], true);
        assert_eq!(run(ActionKind::FundingCampaign).await, completed());
        assert_eq!(
            run(ActionKind::Custom("nope".into())).await,
            json!({"status": "unknown_action"})
        );
    }

    #[tokio::test]
    async fn test_add_to_sequence_surfaces_connector_result() {
        let (exec, _, connector) = executor();
        let event = Event::new("email_sent", "p-1", "Ada");
        let outcome = exec
            .execute(
                &ActionKind::AddToExternalSequence,
                &event,
                &json!({"apolloSequenceId": "seq_linkedin_bump_v2"}),
            )
            .await
            .unwrap();
        assert_eq!(outcome.action, "add_to_apollo_sequence");
        assert_eq!(outcome.result["external_system"], "Apollo");
        assert_eq!(
            connector.calls.lock().unwrap()[0],
            ("p-1".to_string(), "seq_linkedin_bump_v2".to_string())
        );
    }

    #[tokio::test]
    async fn test_add_to_sequence_error_propagates() {
        let memory = memory_store();
        let connector = Arc::new(FakeConnector {
            fail: true,
            ..FakeConnector::default()
        });
        let exec = ActionExecutor::new(memory, connector);
        let event = Event::new("email_sent", "p-1", "Ada");
        let err = exec
            .execute(
                &ActionKind::AddToExternalSequence,
                &event,
                &json!({"apolloSequenceId": "s"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::Connector(_)));
    }

    #[tokio::test]
    async fn test_job_change_drafts_email() {
        let (exec, _, _) = executor();
        let generator = Arc::new(FakeGenerator::replying(
            "```json\n{\"subject\": \"Congrats on Globex!\", \"body\": \"Hi Ada\"}\n```",
        ));
        let exec = exec
            .with_generator(generator.clone())
            .with_company_name("Acme");
        let outcome = exec
            .execute(&ActionKind::JobChangeCampaign, &job_change_event(), &json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.result["status"], "draft_created");
        assert_eq!(outcome.result["campaign_status"], "ready_to_send");
        assert_eq!(outcome.result["draft"]["subject"], "Congrats on Globex!");
        let prompt = generator.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Globex as VP Sales"));
        assert!(prompt.contains("My Company: Acme"));
    }

    #[tokio::test]
    async fn test_job_change_degrades_on_failure_and_timeout() {
        let (exec, _, _) = executor();
        let exec = exec.with_generator(Arc::new(FakeGenerator::failing()));
        let outcome = exec
            .execute(&ActionKind::JobChangeCampaign, &job_change_event(), &json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.result, json!({"status": "failed"}));

        let (exec, _, _) = executor();
        let slow = FakeGenerator {
            delay: Duration::from_secs(5),
            ..FakeGenerator::replying("{}")
        };
        let exec = exec
            .with_generator(Arc::new(slow))
            .with_timeout(Duration::from_millis(20));
        let outcome = exec
            .execute(&ActionKind::JobChangeCampaign, &job_change_event(), &json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.result, json!({"status": "failed"}));
    }

    #[tokio::test]
    async fn test_job_change_without_fields_completes() {
        let (exec, _, _) = executor();
        let event = Event::new("prospect_job_changed", "p-1", "Ada")
            .with_data(json!({"prospectName": "Ada"}));
        let outcome = exec
            .execute(&ActionKind::JobChangeCampaign, &event, &json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.result, completed());
    }
}
