//! Prospect memory service: long-lived per-prospect context persisted as one
//! map under a single key.

use chrono::Utc;
use nexus_core::traits::KeyValueStore;
use nexus_core::types::{EpisodicLesson, InteractionEvent, Prospect, ProspectMemory, SequenceAdaptation};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const PROSPECT_MEMORY_KEY: &str = "sdr_prospect_memory";

pub struct ProspectMemoryStore {
    store: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles on the shared map.
    write_lock: Mutex<()>,
}

impl ProspectMemoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// All memories keyed by prospect id. Unreadable data is treated as empty.
    pub async fn all(&self) -> BTreeMap<String, ProspectMemory> {
        let Some(raw) = self.store.load(PROSPECT_MEMORY_KEY).await else {
            return BTreeMap::new();
        };
        match serde_json::from_value(raw) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("⚠️ Prospect memory unreadable, starting empty: {}", e);
                BTreeMap::new()
            }
        }
    }

    pub async fn get(&self, prospect_id: &str) -> Option<ProspectMemory> {
        self.all().await.remove(prospect_id)
    }

    pub async fn save(&self, memory: ProspectMemory) {
        let _guard = self.write_lock.lock().await;
        let mut all = self.all().await;
        all.insert(memory.prospect_id.clone(), memory);
        self.persist(&all).await;
    }

    /// Create memory for a prospect, or return the existing one untouched.
    pub async fn initialize(&self, prospect: &Prospect) -> ProspectMemory {
        let _guard = self.write_lock.lock().await;
        let mut all = self.all().await;
        if let Some(existing) = all.get(&prospect.id) {
            return existing.clone();
        }

        let mut memory = ProspectMemory::new(&prospect.id);
        memory.basic_info = json!({
            "name": prospect.name,
            "email": prospect.email,
            "title": prospect.title,
            "company": prospect.company,
            "linkedin": prospect.linkedin_url,
        });
        memory.enrichment_data = json!({
            "technologies": prospect.technologies,
            "funding": prospect.funding,
            "recentNews": prospect.recent_news,
        });
        memory.engagement_score = prospect.engagement;
        if !prospect.status.is_empty() {
            memory.lead_status = prospect.status.clone();
        }

        all.insert(prospect.id.clone(), memory.clone());
        self.persist(&all).await;
        tracing::info!("🧠 Initialized memory for prospect {}", prospect.id);
        memory
    }

    pub async fn add_interaction(&self, prospect_id: &str, interaction: InteractionEvent) {
        self.update(prospect_id, |m| m.interaction_history.push(interaction))
            .await;
    }

    pub async fn add_episodic_lesson(&self, prospect_id: &str, outcome: &str, key_learning: &str) {
        let lesson = EpisodicLesson {
            prospect_id: prospect_id.to_string(),
            outcome: outcome.to_string(),
            key_learning: key_learning.to_string(),
            timestamp: Utc::now(),
        };
        self.update(prospect_id, |m| m.episodic_lessons.push(lesson))
            .await;
    }

    /// Shallow-merge `adaptation` into the prospect's current adaptation.
    /// Does nothing when the prospect has no memory yet.
    pub async fn update_adaptation(&self, prospect_id: &str, adaptation: SequenceAdaptation) -> bool {
        self.update(prospect_id, |m| match m.sequence_adaptations.as_mut() {
            Some(current) => current.merge(adaptation),
            None => m.sequence_adaptations = Some(adaptation),
        })
        .await
    }

    /// Apply `f` to an existing memory and persist. Returns false if absent.
    async fn update<F>(&self, prospect_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ProspectMemory),
    {
        let _guard = self.write_lock.lock().await;
        let mut all = self.all().await;
        let Some(memory) = all.get_mut(prospect_id) else {
            tracing::debug!("🧠 No memory for prospect {}, update skipped", prospect_id);
            return false;
        };
        f(memory);
        self.persist(&all).await;
        true
    }

    async fn persist(&self, all: &BTreeMap<String, ProspectMemory>) {
        match serde_json::to_value(all) {
            Ok(value) => self.store.save(PROSPECT_MEMORY_KEY, &value).await,
            Err(e) => tracing::error!("❌ Failed to serialize prospect memory: {}", e),
        }
    }

    /// Raw stored document, for inspection.
    pub async fn raw(&self) -> Value {
        self.store
            .load(PROSPECT_MEMORY_KEY)
            .await
            .unwrap_or_else(|| json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use nexus_core::types::{Channel, Direction, OverridePriority};

    fn store() -> ProspectMemoryStore {
        ProspectMemoryStore::new(Arc::new(InMemoryStore::new()))
    }

    fn prospect(id: &str) -> Prospect {
        Prospect {
            id: id.into(),
            name: "Ada Lovelace".into(),
            company: "Analytical".into(),
            status: "engaged".into(),
            engagement: 42.0,
            recent_news: "Raised a Series A".into(),
            ..Prospect::default()
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let s = store();
        let first = s.initialize(&prospect("p-1")).await;
        assert_eq!(first.lead_status, "engaged");
        assert_eq!(first.engagement_score, 42.0);
        assert_eq!(first.basic_info["name"], "Ada Lovelace");
        assert_eq!(first.enrichment_data["recentNews"], "Raised a Series A");

        let mut changed = prospect("p-1");
        changed.status = "lost".into();
        let second = s.initialize(&changed).await;
        assert_eq!(second.lead_status, "engaged");
        assert_eq!(s.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_adaptation_merges() {
        let s = store();
        s.initialize(&prospect("p-1")).await;
        assert!(
            s.update_adaptation(
                "p-1",
                SequenceAdaptation::new("pricing").with_priority(OverridePriority::Urgent)
            )
            .await
        );
        s.update_adaptation(
            "p-1",
            SequenceAdaptation::new("opens").with_channel(Channel::Linkedin),
        )
        .await;

        let adaptation = s.get("p-1").await.unwrap().sequence_adaptations.unwrap();
        assert_eq!(adaptation.override_priority, Some(OverridePriority::Urgent));
        assert_eq!(adaptation.override_next_channel, Some(Channel::Linkedin));
        assert_eq!(adaptation.reason, "opens");
    }

    #[tokio::test]
    async fn test_update_without_memory_is_noop() {
        let s = store();
        assert!(!s.update_adaptation("ghost", SequenceAdaptation::new("x")).await);
        assert!(s.get("ghost").await.is_none());
        assert_eq!(s.raw().await, json!({}));
    }

    #[tokio::test]
    async fn test_add_interaction_and_lesson() {
        let s = store();
        s.initialize(&prospect("p-1")).await;
        s.add_interaction(
            "p-1",
            InteractionEvent {
                date: Utc::now(),
                channel: "email".into(),
                direction: Direction::Outbound,
                content_summary: "intro".into(),
                outcome: "sent".into(),
                sentiment: None,
                intent: None,
            },
        )
        .await;
        s.add_episodic_lesson("p-1", "won", "Led with ROI").await;

        let memory = s.get("p-1").await.unwrap();
        assert_eq!(memory.interaction_history.len(), 1);
        assert_eq!(memory.episodic_lessons[0].key_learning, "Led with ROI");
        assert!(memory.last_outbound().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let s = Arc::new(store());
        s.initialize(&prospect("p-1")).await;
        let mut handles = Vec::new();
        for i in 0..10 {
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                s.add_episodic_lesson("p-1", "won", &format!("lesson {i}")).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(s.get("p-1").await.unwrap().episodic_lessons.len(), 10);
    }
}
