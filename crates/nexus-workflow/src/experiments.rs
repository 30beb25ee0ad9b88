//! Two-variant reply-rate experiments and their significance.

use nexus_core::traits::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const EXPERIMENTS_KEY: &str = "sdr_experiments";

/// Smallest per-variant sample for which significance is reported.
pub const MIN_SAMPLE: u32 = 30;

/// Significance at or above which an experiment may be concluded.
pub const CONCLUDE_THRESHOLD: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantId {
    A,
    B,
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantId::A => f.write_str("A"),
            VariantId::B => f.write_str("B"),
        }
    }
}

impl std::str::FromStr for VariantId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(VariantId::A),
            "B" | "b" => Ok(VariantId::B),
            other => Err(format!("unknown variant '{other}', expected A or B")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantStats {
    pub sent: u32,
    pub replied: u32,
}

impl VariantStats {
    pub fn reply_rate(&self) -> f64 {
        f64::from(self.replied) / f64::from(self.sent.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentVariant {
    pub id: VariantId,
    #[serde(default)]
    pub name: String,
    /// Share of traffic, percent.
    pub allocation: u8,
    #[serde(default)]
    pub stats: VariantStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: ExperimentStatus,
    /// Control first, variation second.
    pub variants: Vec<ExperimentVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<VariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance: Option<u8>,
}

impl Experiment {
    /// New running experiment. `allocation_a` is variant A's share; B gets the rest.
    pub fn new(id: impl Into<String>, name_a: &str, name_b: &str, allocation_a: u8) -> Self {
        let allocation_a = allocation_a.min(100);
        Self {
            id: id.into(),
            name: String::new(),
            status: ExperimentStatus::Running,
            variants: vec![
                ExperimentVariant {
                    id: VariantId::A,
                    name: name_a.into(),
                    allocation: allocation_a,
                    stats: VariantStats::default(),
                },
                ExperimentVariant {
                    id: VariantId::B,
                    name: name_b.into(),
                    allocation: 100 - allocation_a,
                    stats: VariantStats::default(),
                },
            ],
            winner: None,
            significance: None,
        }
    }

    pub fn variant(&self, id: VariantId) -> Option<&ExperimentVariant> {
        self.variants.iter().find(|v| v.id == id)
    }

    fn recompute(&mut self) {
        if let [control, variation, ..] = self.variants.as_slice() {
            self.significance = Some(significance(&control.stats, &variation.stats));
        }
    }
}

/// Confidence (0..=99) that the two reply rates differ, by a pooled
/// two-proportion z-test.
///
/// Below [`MIN_SAMPLE`] sends on either side the answer is 0. A degenerate
/// pooled rate (all or nothing replied) is also 0.
pub fn significance(control: &VariantStats, variation: &VariantStats) -> u8 {
    let (n1, n2) = (control.sent, variation.sent);
    if n1 < MIN_SAMPLE || n2 < MIN_SAMPLE {
        return 0;
    }
    let (n1, n2) = (f64::from(n1), f64::from(n2));
    let p1 = control.reply_rate();
    let p2 = variation.reply_rate();
    let pooled = (f64::from(control.replied) + f64::from(variation.replied)) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    let z = (p1 - p2).abs() / se;

    if !z.is_finite() {
        return 0;
    }
    if z > 2.58 {
        99
    } else if z > 1.96 {
        95
    } else {
        (z / 1.96 * 95.0).min(80.0).floor() as u8
    }
}

/// Experiment collection persisted under [`EXPERIMENTS_KEY`].
pub struct ExperimentBook {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl ExperimentBook {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn experiments(&self) -> Vec<Experiment> {
        let Some(raw) = self.store.load(EXPERIMENTS_KEY).await else {
            return Vec::new();
        };
        serde_json::from_value(raw).unwrap_or_else(|e| {
            tracing::warn!("⚠️ Stored experiments unreadable: {}", e);
            Vec::new()
        })
    }

    pub async fn active(&self) -> Vec<Experiment> {
        self.experiments()
            .await
            .into_iter()
            .filter(|e| e.status == ExperimentStatus::Running)
            .collect()
    }

    pub async fn save_all(&self, experiments: &[Experiment]) {
        match serde_json::to_value(experiments) {
            Ok(value) => self.store.save(EXPERIMENTS_KEY, &value).await,
            Err(e) => tracing::error!("❌ Failed to serialize experiments: {}", e),
        }
    }

    /// Add an experiment, replacing any with the same id.
    pub async fn create(&self, experiment: Experiment) {
        let _guard = self.write_lock.lock().await;
        let mut all = self.experiments().await;
        all.retain(|e| e.id != experiment.id);
        tracing::info!("🧪 Experiment {} created", experiment.id);
        all.push(experiment);
        self.save_all(&all).await;
    }

    /// Pick the variant for the next send. `roll` is uniform in `[0, 100)`.
    ///
    /// A concluded experiment always serves its winner.
    pub async fn assign_variant(&self, experiment_id: &str, roll: f64) -> Option<ExperimentVariant> {
        let experiment = self
            .experiments()
            .await
            .into_iter()
            .find(|e| e.id == experiment_id)?;

        if let (ExperimentStatus::Completed, Some(winner)) = (experiment.status, experiment.winner) {
            return experiment
                .variant(winner)
                .or_else(|| experiment.variants.first())
                .cloned();
        }

        let first = experiment.variants.first()?;
        if roll <= f64::from(first.allocation) {
            Some(first.clone())
        } else {
            experiment.variants.get(1).cloned()
        }
    }

    pub async fn track_send(&self, experiment_id: &str, variant: VariantId) {
        self.bump(experiment_id, variant, |s| s.sent = s.sent.saturating_add(1)).await;
    }

    pub async fn track_reply(&self, experiment_id: &str, variant: VariantId) {
        self.bump(experiment_id, variant, |s| s.replied = s.replied.saturating_add(1)).await;
    }

    /// Increment a counter and recompute significance. Unknown experiment or
    /// variant is a no-op.
    async fn bump<F>(&self, experiment_id: &str, variant: VariantId, f: F)
    where
        F: FnOnce(&mut VariantStats),
    {
        let _guard = self.write_lock.lock().await;
        let mut all = self.experiments().await;
        let Some(experiment) = all.iter_mut().find(|e| e.id == experiment_id) else {
            tracing::debug!("🧪 Unknown experiment {}", experiment_id);
            return;
        };
        let Some(v) = experiment.variants.iter_mut().find(|v| v.id == variant) else {
            return;
        };
        f(&mut v.stats);
        experiment.recompute();
        self.save_all(&all).await;
    }

    /// Mark the experiment completed when its significance has reached
    /// [`CONCLUDE_THRESHOLD`]; the variant with the higher reply rate wins.
    /// Returns the winner, or `None` if the experiment cannot be concluded.
    pub async fn conclude(&self, experiment_id: &str) -> Option<VariantId> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.experiments().await;
        let experiment = all.iter_mut().find(|e| e.id == experiment_id)?;
        if experiment.status == ExperimentStatus::Completed {
            return experiment.winner;
        }

        experiment.recompute();
        if experiment.significance.unwrap_or(0) < CONCLUDE_THRESHOLD {
            return None;
        }
        let winner = experiment
            .variants
            .iter()
            .max_by(|a, b| a.stats.reply_rate().total_cmp(&b.stats.reply_rate()))?
            .id;
        experiment.status = ExperimentStatus::Completed;
        experiment.winner = Some(winner);
        tracing::info!("🏆 Experiment {} concluded, winner {}", experiment_id, winner);
        self.save_all(&all).await;
        Some(winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_memory::InMemoryStore;

    fn stats(sent: u32, replied: u32) -> VariantStats {
        VariantStats { sent, replied }
    }

    fn book() -> ExperimentBook {
        ExperimentBook::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn test_strong_difference_is_99() {
        assert_eq!(significance(&stats(100, 10), &stats(100, 25)), 99);
    }

    #[test]
    fn test_small_samples_are_zero() {
        for sent in 0..MIN_SAMPLE {
            assert_eq!(significance(&stats(sent, 0), &stats(100, 50)), 0);
            assert_eq!(significance(&stats(100, 50), &stats(sent, sent)), 0);
        }
    }

    #[test]
    fn test_degenerate_pool_is_zero() {
        assert_eq!(significance(&stats(50, 0), &stats(50, 0)), 0);
        assert_eq!(significance(&stats(50, 50), &stats(50, 50)), 0);
    }

    #[test]
    fn test_monotonic_in_gap() {
        let control = stats(100, 10);
        let mut previous = 0;
        for replied in 10..=60 {
            let s = significance(&control, &stats(100, replied));
            assert!(s >= previous, "replied={replied}: {s} < {previous}");
            previous = s;
        }
        assert_eq!(previous, 99);
    }

    #[test]
    fn test_sub_threshold_capped_at_80() {
        let s = significance(&stats(100, 10), &stats(100, 17));
        assert!(s > 0 && s <= 80, "{s}");
    }

    #[test]
    fn test_counts_near_u32_max() {
        let big = stats(3_000_000_000, 3_000_000_000);
        let other = stats(3_000_000_000, 2_000_000_000);
        assert_eq!(significance(&big, &other), 99);
        assert_eq!(significance(&stats(u32::MAX, u32::MAX), &stats(u32::MAX, u32::MAX)), 0);
    }

    #[tokio::test]
    async fn test_counters_saturate() {
        let b = book();
        let mut exp = Experiment::new("exp-1", "a", "b", 50);
        exp.variants[0].stats = stats(u32::MAX, u32::MAX);
        b.create(exp).await;
        b.track_send("exp-1", VariantId::A).await;
        b.track_reply("exp-1", VariantId::A).await;
        let all = b.experiments().await;
        assert_eq!(all[0].variants[0].stats, stats(u32::MAX, u32::MAX));
    }

    #[tokio::test]
    async fn test_track_and_conclude() {
        let b = book();
        b.create(Experiment::new("exp-1", "Short subject", "Question subject", 50))
            .await;
        for _ in 0..100 {
            b.track_send("exp-1", VariantId::A).await;
            b.track_send("exp-1", VariantId::B).await;
        }
        for _ in 0..10 {
            b.track_reply("exp-1", VariantId::A).await;
            b.track_reply("exp-1", VariantId::B).await;
        }
        assert_eq!(b.conclude("exp-1").await, None);
        for _ in 0..15 {
            b.track_reply("exp-1", VariantId::B).await;
        }
        let all = b.experiments().await;
        let exp = &all[0];
        assert_eq!(exp.significance, Some(99));
        assert_eq!(exp.variant(VariantId::B).unwrap().stats, stats(100, 25));

        assert_eq!(b.conclude("exp-1").await, Some(VariantId::B));
        assert!(b.active().await.is_empty());
        for roll in [0.0, 25.0, 99.9] {
            assert_eq!(
                b.assign_variant("exp-1", roll).await.unwrap().id,
                VariantId::B
            );
        }
    }

    #[tokio::test]
    async fn test_assign_by_allocation() {
        let b = book();
        b.create(Experiment::new("exp-1", "a", "b", 30)).await;
        assert_eq!(b.assign_variant("exp-1", 0.0).await.unwrap().id, VariantId::A);
        assert_eq!(b.assign_variant("exp-1", 30.0).await.unwrap().id, VariantId::A);
        assert_eq!(b.assign_variant("exp-1", 30.5).await.unwrap().id, VariantId::B);
        assert!(b.assign_variant("missing", 0.0).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_noops() {
        let b = book();
        b.create(Experiment::new("exp-1", "a", "b", 50)).await;
        b.track_send("nope", VariantId::A).await;
        let all = b.experiments().await;
        let exp = &all[0];
        assert_eq!(exp.variants[0].stats, VariantStats::default());
        assert!(exp.significance.is_none());
    }

    #[test]
    fn test_variant_id_parse() {
        assert_eq!("A".parse::<VariantId>().unwrap(), VariantId::A);
        assert_eq!("b".parse::<VariantId>().unwrap(), VariantId::B);
        assert!("C".parse::<VariantId>().is_err());
    }
}
