//! Send pacing: greedy hourly slot assignment for outbound activities.
//!
//! Highest priority first. For each activity the search starts one hour after
//! the (hour-truncated) start instant and walks forward an hour at a time for
//! at most a week, taking the first hour that passes every constraint:
//!
//! 1. weekday not in `avoid_days`
//! 2. inside `[9, 17)` local time, when `business_hours_only`
//! 3. hour bucket below `max_emails_per_hour`
//! 4. at least `min_gap_minutes` after this prospect's previous slot
//!
//! Usage and last-slot maps live for one call only, so concurrent calls never
//! share pacing state.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hours searched before an activity is declared unschedulable.
pub const MAX_SEARCH_HOURS: usize = 168;

const BUSINESS_START_HOUR: u32 = 9;
const BUSINESS_END_HOUR: u32 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    #[default]
    Pending,
    Scheduled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledActivity {
    pub id: String,
    #[serde(rename = "prospectId")]
    pub prospect_id: String,
    #[serde(rename = "type", default)]
    pub activity_type: String,
    #[serde(default)]
    pub status: ActivityStatus,
    #[serde(default)]
    pub priority: i32,
    #[serde(rename = "scheduledTime", default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ScheduledActivity {
    pub fn new(id: impl Into<String>, prospect_id: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            prospect_id: prospect_id.into(),
            activity_type: "email".into(),
            status: ActivityStatus::Pending,
            priority,
            scheduled_time: None,
            content: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConstraints {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Weekdays to skip, 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub avoid_days: Vec<u8>,
    #[serde(default)]
    pub business_hours_only: bool,
    #[serde(default = "default_max_per_hour")]
    pub max_emails_per_hour: u32,
    #[serde(default)]
    pub min_gap_minutes: i64,
    #[serde(default)]
    pub respect_timezone: bool,
}

fn default_max_per_hour() -> u32 {
    10
}

impl Default for SchedulingConstraints {
    fn default() -> Self {
        Self {
            start_date: None,
            avoid_days: Vec::new(),
            business_hours_only: true,
            max_emails_per_hour: default_max_per_hour(),
            min_gap_minutes: 60,
            respect_timezone: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedSchedule {
    pub activities: Vec<ScheduledActivity>,
    pub total_scheduled: usize,
    pub schedule_span: ScheduleSpan,
    pub expected_performance: String,
    pub optimization_notes: Vec<String>,
}

/// Assigns send slots. Weekdays and business hours are judged in `offset`.
#[derive(Debug, Clone, Copy)]
pub struct SendScheduler {
    offset: FixedOffset,
}

impl Default for SendScheduler {
    fn default() -> Self {
        Self::utc()
    }
}

impl SendScheduler {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Local calendar at a fixed offset from UTC. Out-of-range offsets fall back to UTC.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        match minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
        {
            Some(offset) => Self { offset },
            None => {
                tracing::warn!("⚠️ Invalid UTC offset {} minutes, using UTC", minutes);
                Self::utc()
            }
        }
    }

    pub fn schedule(
        &self,
        activities: Vec<ScheduledActivity>,
        constraints: &SchedulingConstraints,
        now: DateTime<Utc>,
    ) -> OptimizedSchedule {
        let requested = activities.len();
        let mut queue = activities;
        // Stable: equal priorities keep input order.
        queue.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut usage: HashMap<String, u32> = HashMap::new();
        let mut last_slot: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut notes = Vec::new();
        let mut span: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

        let origin = match constraints.start_date {
            Some(start) if start > now => start,
            _ => now,
        };

        for activity in &mut queue {
            match self.find_slot(&activity.prospect_id, origin, constraints, &usage, &last_slot) {
                Some(slot) => {
                    activity.scheduled_time = Some(slot);
                    activity.status = ActivityStatus::Scheduled;
                    *usage.entry(hour_key(slot)).or_insert(0) += 1;
                    last_slot.insert(activity.prospect_id.clone(), slot);
                    span = Some(match span {
                        Some((lo, hi)) => (lo.min(slot), hi.max(slot)),
                        None => (slot, slot),
                    });
                }
                None => {
                    activity.status = ActivityStatus::Failed;
                    tracing::warn!("⚠️ No slot for activity {} within {}h", activity.id, MAX_SEARCH_HOURS);
                    notes.push(format!(
                        "Failed to schedule activity {} within limits.",
                        activity.id
                    ));
                }
            }
        }

        let total_scheduled = queue
            .iter()
            .filter(|a| a.status == ActivityStatus::Scheduled)
            .count();
        if constraints.business_hours_only {
            notes.push("Restricted to 9am-5pm.".into());
        }
        if constraints.respect_timezone {
            notes.push("Timezones respected.".into());
        }
        notes.push(format!("Scheduled {total_scheduled} / {requested} tasks."));
        tracing::info!("📅 Scheduled {}/{} activities", total_scheduled, requested);

        let (start, end) = span.unwrap_or((now, now));
        OptimizedSchedule {
            activities: queue,
            total_scheduled,
            schedule_span: ScheduleSpan { start, end },
            expected_performance: "High".into(),
            optimization_notes: notes,
        }
    }

    fn find_slot(
        &self,
        prospect_id: &str,
        origin: DateTime<Utc>,
        constraints: &SchedulingConstraints,
        usage: &HashMap<String, u32>,
        last_slot: &HashMap<String, DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let mut cursor = self.truncate_to_hour(origin) + Duration::hours(1);
        let previous = last_slot.get(prospect_id);

        for _ in 0..MAX_SEARCH_HOURS {
            let local = cursor.with_timezone(&self.offset);
            let weekday = local.weekday().num_days_from_sunday() as u8;
            let hour = local.hour();

            let allowed = !constraints.avoid_days.contains(&weekday)
                && (!constraints.business_hours_only
                    || (BUSINESS_START_HOUR..BUSINESS_END_HOUR).contains(&hour))
                && usage.get(&hour_key(cursor)).copied().unwrap_or(0)
                    < constraints.max_emails_per_hour
                && previous.is_none_or(|last| {
                    (cursor - *last).num_minutes() >= constraints.min_gap_minutes
                });

            if allowed {
                return Some(cursor);
            }
            cursor += Duration::hours(1);
        }
        None
    }

    /// Zero minutes, seconds and sub-seconds in the local calendar.
    fn truncate_to_hour(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = instant.with_timezone(&self.offset);
        local
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(instant)
    }
}

/// Hour bucket key, UTC: `YYYY-MM-DDTHH`.
fn hour_key(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H").to_string()
}
