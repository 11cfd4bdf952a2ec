//! Tasks-domain adapter: surfaces upcoming reminders ahead of the prompt and
//! parses "remind me to X ..." into a stored reminder, understanding both
//! relative ("in 2 hours") and absolute ("tomorrow at 3pm", "next friday at
//! 9:30am", "at 6") time expressions — ported from the original's
//! `_RELATIVE_PATTERNS`/`_ABSOLUTE_PATTERNS`/`parse_reminder_time`.

use async_trait::async_trait;
use chrono::{Datelike, Duration, Local, NaiveDate, TimeZone, Utc, Weekday};
use once_cell::sync::Lazy;
use psycho_core::domain::{DomainArtifacts, DomainContext, DomainHandler};
use psycho_core::model::{now_ts, Priority, Recurrence, Reminder};
use psycho_core::store::RelationalStore;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

static TITLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)remind me to (.+?)\s+(?:at|in|tomorrow|next|on)\b", r"(?i)remind me to (.+)$"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

static REL_MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d+)\s*minutes?\b").unwrap());
static REL_HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d+)\s*hours?\b").unwrap());
static REL_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d+)\s*days?\b").unwrap());
static REL_WEEKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d+)\s*weeks?\b").unwrap());
static REL_HALF_HOUR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\s+half\s+an?\s+hour\b").unwrap());
static REL_AN_HOUR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\s+an?\s+hour\b").unwrap());

static ABS_TOMORROW_TODAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(tomorrow|today)\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?").unwrap());
static ABS_NEXT_WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bnext\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?")
        .unwrap()
});
static ABS_AT_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bat\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?").unwrap());

const DEFAULT_DELAY_SECS: i64 = 3600;

pub struct TasksHandler {
    relational: Arc<RelationalStore>,
}

impl TasksHandler {
    pub fn new(relational: Arc<RelationalStore>) -> Self {
        Self { relational }
    }
}

#[async_trait]
impl DomainHandler for TasksHandler {
    fn domain(&self) -> &'static str {
        "tasks"
    }

    async fn context_for_prompt(&self, _query: &str) -> DomainContext {
        let now = now_ts();
        let upcoming = self.relational.due_reminders(now + 86400).unwrap_or_default();
        if upcoming.is_empty() {
            return DomainContext::default();
        }
        let lines: Vec<String> = upcoming
            .iter()
            .take(5)
            .map(|r| format!("- {} (due {})", r.title, psycho_core::model::from_ts(r.due_timestamp)))
            .collect();
        DomainContext { text: format!("PENDING TASKS (next 24h):\n{}", lines.join("\n")) }
    }

    async fn post_process(&self, user_message: &str, _agent_response: &str) -> DomainArtifacts {
        if !user_message.to_lowercase().contains("remind") {
            return DomainArtifacts::default();
        }
        let Some(title) = extract_title(user_message) else {
            return DomainArtifacts::default();
        };
        let due = parse_reminder_time(user_message).unwrap_or_else(|| now_ts() + DEFAULT_DELAY_SECS);
        let reminder = Reminder {
            id: Uuid::new_v4().to_string(),
            title: title.clone(),
            notes: None,
            due_timestamp: due,
            recurrence: Recurrence::None,
            priority: Priority::Normal,
            completed: false,
            snoozed_until: 0,
            created_at: now_ts(),
            session_id: None,
        };
        if self.relational.insert_reminder(&reminder).is_ok() {
            DomainArtifacts { created_reminders: vec![title], ..Default::default() }
        } else {
            DomainArtifacts::default()
        }
    }
}

fn extract_title(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    for pattern in TITLE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&lower) {
            if let Some(m) = caps.get(1) {
                let title = m.as_str().trim().trim_end_matches(|c: char| ".,!?".contains(c)).to_string();
                if title.len() >= 2 {
                    return Some(title);
                }
            }
        }
    }
    None
}

fn apply_meridiem(hour: u32, meridiem: Option<&str>) -> u32 {
    match meridiem {
        Some(m) if m.eq_ignore_ascii_case("pm") && hour < 12 => hour + 12,
        Some(m) if m.eq_ignore_ascii_case("am") && hour == 12 => 0,
        _ => hour,
    }
}

fn weekday_from_str(s: &str) -> Option<Weekday> {
    match s {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn local_date_time_to_ts(date: NaiveDate, hour: u32, minute: u32) -> Option<i64> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    let local = Local.from_local_datetime(&naive).single()?;
    Some(local.with_timezone(&Utc).timestamp())
}

/// Relative patterns are tried first, then absolute ones, mirroring the
/// original's `parse_reminder_time` fallthrough order.
fn parse_reminder_time(text: &str) -> Option<i64> {
    let lower = text.to_lowercase();

    if let Some(caps) = REL_MINUTES.captures(&lower) {
        return Some(now_ts() + caps[1].parse::<i64>().ok()? * 60);
    }
    if let Some(caps) = REL_HOURS.captures(&lower) {
        return Some(now_ts() + caps[1].parse::<i64>().ok()? * 3600);
    }
    if let Some(caps) = REL_DAYS.captures(&lower) {
        return Some(now_ts() + caps[1].parse::<i64>().ok()? * 86400);
    }
    if let Some(caps) = REL_WEEKS.captures(&lower) {
        return Some(now_ts() + caps[1].parse::<i64>().ok()? * 7 * 86400);
    }
    if REL_HALF_HOUR.is_match(&lower) {
        return Some(now_ts() + 1800);
    }
    if REL_AN_HOUR.is_match(&lower) {
        return Some(now_ts() + 3600);
    }

    let now_local = Local::now();

    if let Some(caps) = ABS_TOMORROW_TODAY.captures(&lower) {
        let base_date =
            if &caps[1] == "today" { now_local.date_naive() } else { now_local.date_naive() + Duration::days(1) };
        let hour = apply_meridiem(caps[2].parse().ok()?, caps.get(4).map(|m| m.as_str()));
        let minute = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        return local_date_time_to_ts(base_date, hour, minute);
    }

    if let Some(caps) = ABS_NEXT_WEEKDAY.captures(&lower) {
        let target_weekday = weekday_from_str(&caps[1])?;
        let hour = apply_meridiem(caps[2].parse().ok()?, caps.get(4).map(|m| m.as_str()));
        let minute = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let today = now_local.weekday().num_days_from_monday() as i64;
        let target = target_weekday.num_days_from_monday() as i64;
        let days_ahead = ((target - today + 7) % 7).max(0);
        let days_ahead = if days_ahead == 0 { 7 } else { days_ahead };
        let base_date = now_local.date_naive() + Duration::days(days_ahead);
        return local_date_time_to_ts(base_date, hour, minute);
    }

    if let Some(caps) = ABS_AT_TIME.captures(&lower) {
        let hour = apply_meridiem(caps[1].parse().ok()?, caps.get(3).map(|m| m.as_str()));
        let minute = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let ts = local_date_time_to_ts(now_local.date_naive(), hour, minute)?;
        return Some(if ts <= now_ts() { ts + 86400 } else { ts });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handler() -> (tempfile::TempDir, TasksHandler) {
        let dir = tempfile::tempdir().unwrap();
        let relational = Arc::new(RelationalStore::new(dir.path().join("psycho.db")).unwrap());
        (dir, TasksHandler::new(relational))
    }

    #[tokio::test]
    async fn parses_relative_reminder_and_stores_it() {
        let (_dir, handler) = test_handler();
        let artifacts = handler.post_process("remind me to call mom in 2 hours", "").await;
        assert_eq!(artifacts.created_reminders, vec!["call mom".to_string()]);
    }

    #[tokio::test]
    async fn parses_absolute_tomorrow_reminder() {
        let (_dir, handler) = test_handler();
        let artifacts = handler.post_process("remind me to call mom tomorrow at 3pm", "").await;
        assert_eq!(artifacts.created_reminders, vec!["call mom".to_string()]);
    }

    #[test]
    fn tomorrow_at_3pm_resolves_to_local_1500() {
        let ts = parse_reminder_time("call mom tomorrow at 3pm").unwrap();
        let expected_date = Local::now().date_naive() + Duration::days(1);
        let expected = local_date_time_to_ts(expected_date, 15, 0).unwrap();
        assert_eq!(ts, expected);
    }

    #[tokio::test]
    async fn context_lists_reminders_due_within_24h() {
        let (_dir, handler) = test_handler();
        handler.post_process("remind me to water plants in 10 minutes", "").await;
        let ctx = handler.context_for_prompt("anything").await;
        assert!(ctx.text.contains("water plants"));
    }

    #[tokio::test]
    async fn no_artifacts_without_a_matching_phrase() {
        let (_dir, handler) = test_handler();
        let artifacts = handler.post_process("what's on my schedule", "").await;
        assert!(artifacts.created_reminders.is_empty());
    }
}
