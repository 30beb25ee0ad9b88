//! Send-timing advice for a single prospect.
//!
//! A heuristic score around a base of 50, adjusted for the calendar, the
//! spacing since the last outbound touch and enrichment signals in the
//! prospect's news.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use nexus_core::types::{Prospect, ProspectMemory};
use serde::{Deserialize, Serialize};

const BASE_SCORE: i32 = 50;
const MIN_SPACING_DAYS: i64 = 3;

const WEEKEND: &str = "Weekend detected";
const LATE_FRIDAY: &str = "Late Friday";
const HOLIDAY: &str = "Holiday Season";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendAction {
    SendNow,
    ScheduleLater,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRecommendation {
    pub action: SendAction,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_time: Option<String>,
    /// 0..=100
    pub priority_score: u8,
    pub context_factors: Vec<String>,
}

impl SendRecommendation {
    fn has_factor(&self, factor: &str) -> bool {
        self.context_factors.iter().any(|f| f == factor)
    }
}

/// Recommend whether to contact `prospect` at `now` (the sender's local time).
pub fn analyze_timing(
    now: DateTime<FixedOffset>,
    prospect: &Prospect,
    memory: Option<&ProspectMemory>,
) -> SendRecommendation {
    let mut score = BASE_SCORE;
    let mut factors: Vec<String> = Vec::new();
    let mut action = SendAction::SendNow;
    let mut best_time: Option<String> = None;
    let mut reason = String::from("Conditions are acceptable for outreach.");

    let hour = now.hour();
    match now.weekday() {
        Weekday::Sat | Weekday::Sun => {
            action = SendAction::ScheduleLater;
            reason = "It's the weekend. Professional outreach has low open rates.".into();
            best_time = Some("Monday 9:00 AM".into());
            factors.push(WEEKEND.into());
            score -= 20;
        }
        Weekday::Mon => {
            factors.push("Monday - crowded inbox risk".into());
            score -= 5;
        }
        Weekday::Fri if hour > 14 => {
            action = SendAction::ScheduleLater;
            reason = "Late Friday afternoon. Prospect likely checking out.".into();
            best_time = Some("Monday 10:00 AM".into());
            factors.push(LATE_FRIDAY.into());
            score -= 15;
        }
        _ => {}
    }

    if !(8..=18).contains(&hour) {
        if action == SendAction::SendNow {
            action = SendAction::ScheduleLater;
            reason = "Outside typical business hours.".into();
            best_time = Some("Tomorrow 9:30 AM".into());
        }
        factors.push("Outside business hours".into());
    }

    if now.month() == 12 && now.day() > 20 {
        action = SendAction::Hold;
        reason = "End of Year / Holiday Season. Defer to Jan 2nd.".into();
        best_time = Some("January 2nd".into());
        factors.push(HOLIDAY.into());
        score -= 30;
    }

    if let Some(last) = memory.and_then(ProspectMemory::last_outbound) {
        let days = days_between(now.with_timezone(&Utc), last.date);
        if days < MIN_SPACING_DAYS && last.outcome != "replied_positive" {
            action = SendAction::Hold;
            reason = format!("Too soon. Last outreach was {days} days ago.");
            best_time = Some(format!("In {} days", MIN_SPACING_DAYS - days));
            factors.push("Rapid follow-up prevention".into());
            score -= 40;
        } else {
            factors.push(format!("Appropriate spacing ({days} days)"));
            score += 10;
        }
    }

    let news = prospect.recent_news.to_lowercase();
    if news.contains("funding") || news.contains("raised") {
        score += 30;
        factors.push("Recent Funding detected (High Priority)".into());
        if action == SendAction::Hold && !reason.contains("Holiday") {
            action = SendAction::SendNow;
            reason = "Funding news signals high urgency to connect.".into();
        }
    }
    if news.contains("hiring") || news.contains("growth") {
        score += 15;
        factors.push("Growth signals detected".into());
    }

    if prospect.last_activity == "New Lead" {
        factors.push("Fresh Lead".into());
        score += 5;
    }

    SendRecommendation {
        action,
        reason,
        best_time,
        priority_score: score.clamp(0, 100) as u8,
        context_factors: factors,
    }
}

/// Whole days between two instants, rounded up.
fn days_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    const DAY_MS: i64 = 86_400_000;
    let ms = (a - b).num_milliseconds().abs();
    (ms + DAY_MS - 1) / DAY_MS
}

/// One-paragraph calendar context for a generation prompt.
pub fn temporal_context(recommendation: &SendRecommendation, now: DateTime<FixedOffset>) -> String {
    let day = match now.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    };
    let mut context = format!("Current Time Context: It is {day}. ");

    if recommendation.has_factor(WEEKEND) {
        context.push_str("It is the weekend. ");
    } else if recommendation.has_factor(LATE_FRIDAY) {
        context.push_str("It is late Friday afternoon. ");
    } else if now.weekday() == Weekday::Mon {
        context.push_str("It is the start of the week. ");
    }

    if recommendation.context_factors.iter().any(|f| f.contains("Funding")) {
        context.push_str("IMPORTANT: Prospect recently raised funding. Capitalize on this momentum. ");
    }
    context
}
