use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};

use haven_core::atomic::{atomic_write, read_optional};

use crate::error::Result;
use crate::types::{CalendarEvent, DueReminder};

/// Source of upcoming calendar events. The proactive engine is decoupled
/// from any one calendar backend behind this seam; the concrete
/// implementation lives wherever the Google Workspace OAuth cache does.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn upcoming_events(&self, horizon_minutes: u32) -> Result<Vec<CalendarEvent>>;
}

/// Parses `HH:MM`, rejecting anything else — mirrors `_parse_hhmm`.
fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let raw = value.trim();
    if raw.len() != 5 || raw.as_bytes()[2] != b':' {
        return None;
    }
    let hour: u32 = raw[0..2].parse().ok()?;
    let minute: u32 = raw[3..5].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Whether `now_local` falls inside the `start`-`end` window, which may
/// cross midnight (e.g. `22:00`-`06:00`).
pub fn is_quiet_hours_now(now_local: DateTime<Utc>, start: &str, end: &str, enabled: bool) -> bool {
    if !enabled {
        return false;
    }
    let (Some(start), Some(end)) = (parse_hhmm(start), parse_hhmm(end)) else {
        return false;
    };
    if start == end {
        return false;
    }
    let now_t = now_local.time();
    if start < end {
        start <= now_t && now_t < end
    } else {
        now_t >= start || now_t < end
    }
}

/// Dedupe state for proactive reminders, one JSON file per workspace.
pub struct ProactiveStateStore {
    path: PathBuf,
    reminders: Mutex<HashMap<String, DateTime<Utc>>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
struct StateFile {
    #[serde(default)]
    calendar_reminders: HashMap<String, DateTime<Utc>>,
}

impl ProactiveStateStore {
    pub fn open(workspace: &Path) -> Result<Self> {
        let path = workspace.join("state").join("proactive.json");
        let reminders = match read_optional(&path)? {
            Some(raw) if !raw.trim().is_empty() => {
                let file: StateFile = serde_json::from_str(&raw)?;
                file.calendar_reminders
            }
            _ => HashMap::new(),
        };
        Ok(Self {
            path,
            reminders: Mutex::new(reminders),
        })
    }

    pub fn was_notified(&self, reminder_key: &str) -> bool {
        if reminder_key.trim().is_empty() {
            return false;
        }
        self.reminders.lock().unwrap().contains_key(reminder_key)
    }

    pub fn mark_notified(&self, reminder_key: &str, notified_at_utc: DateTime<Utc>) -> Result<()> {
        if reminder_key.trim().is_empty() {
            return Ok(());
        }
        let mut reminders = self.reminders.lock().unwrap();
        reminders.insert(reminder_key.to_string(), notified_at_utc);
        let file = StateFile {
            calendar_reminders: reminders.clone(),
        };
        atomic_write(&self.path, &serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Drop dedupe entries older than `older_than_days` so the state file
    /// doesn't grow without bound.
    pub fn prune(&self, older_than_days: i64) -> Result<()> {
        if older_than_days <= 0 {
            return Ok(());
        }
        let threshold = Utc::now() - chrono::Duration::days(older_than_days);
        let mut reminders = self.reminders.lock().unwrap();
        let before = reminders.len();
        reminders.retain(|_, at| *at >= threshold);
        if reminders.len() != before {
            let file = StateFile {
                calendar_reminders: reminders.clone(),
            };
            atomic_write(&self.path, &serde_json::to_string_pretty(&file)?)?;
        }
        Ok(())
    }
}

/// Compute due reminders for `events` against `lead_minutes` offsets
/// (e.g. `{30, 10}`), marking each fired reminder as notified so it is not
/// reported again. `scan_minutes` is the tick interval — a lead fires once
/// the event's time-to-start falls within `[lead - scan_minutes, lead]`.
pub fn compute_due_calendar_reminders(
    events: &[CalendarEvent],
    now_utc: DateTime<Utc>,
    lead_minutes: &[u32],
    scan_minutes: u32,
    horizon_minutes: u32,
    state: &ProactiveStateStore,
) -> Result<Vec<DueReminder>> {
    let mut leads: Vec<u32> = lead_minutes.iter().copied().filter(|l| *l > 0).collect();
    if leads.is_empty() {
        leads = vec![30, 10];
    }
    leads.sort_unstable_by(|a, b| b.cmp(a));
    let scan_window = scan_minutes.max(1);
    let horizon = horizon_minutes.max(5);

    let mut due = Vec::new();
    for event in events {
        let Some(start_utc) = event.start else { continue };
        let delta_minutes = (start_utc - now_utc).num_minutes();
        if delta_minutes < 0 || delta_minutes > horizon as i64 {
            continue;
        }

        let mut selected_lead = 0u32;
        for lead in &leads {
            let lower_bound = lead.saturating_sub(scan_window) as i64;
            if lower_bound <= delta_minutes && delta_minutes <= *lead as i64 {
                selected_lead = *lead;
                break;
            }
        }
        if selected_lead == 0 {
            continue;
        }

        let reminder_key = format!("{}:{}:{}", event.id, start_utc.to_rfc3339(), selected_lead);
        if state.was_notified(&reminder_key) {
            continue;
        }
        state.mark_notified(&reminder_key, now_utc)?;

        due.push(DueReminder {
            event_id: event.id.clone(),
            summary: event.summary.clone(),
            minutes_to_start: delta_minutes,
            lead_minutes: selected_lead,
            reminder_key,
        });
    }
    Ok(due)
}

/// Composed by the gateway binary alongside `CronEngine`, not merged into
/// it — the cron tick loop advances jobs, this one watches a calendar
/// source and respects quiet hours.
pub struct ProactiveEngine {
    calendar: Box<dyn CalendarSource>,
    state: ProactiveStateStore,
    lead_minutes: Vec<u32>,
    scan_minutes: u32,
    horizon_minutes: u32,
    quiet_hours_enabled: bool,
    quiet_start: String,
    quiet_end: String,
}

impl ProactiveEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        calendar: Box<dyn CalendarSource>,
        state: ProactiveStateStore,
        lead_minutes: Vec<u32>,
        scan_minutes: u32,
        horizon_minutes: u32,
        quiet_hours_enabled: bool,
        quiet_start: String,
        quiet_end: String,
    ) -> Self {
        Self {
            calendar,
            state,
            lead_minutes,
            scan_minutes,
            horizon_minutes,
            quiet_hours_enabled,
            quiet_start,
            quiet_end,
        }
    }

    /// Run one scan, returning any reminders that should be delivered.
    /// Quiet hours suppress delivery but the scan still records dedupe
    /// state, matching the reference engine's "suppress, don't skip" rule.
    pub async fn scan_once(&self, now_utc: DateTime<Utc>) -> Result<Vec<DueReminder>> {
        let events = self.calendar.upcoming_events(self.horizon_minutes).await?;
        let due = compute_due_calendar_reminders(
            &events,
            now_utc,
            &self.lead_minutes,
            self.scan_minutes,
            self.horizon_minutes,
            &self.state,
        )?;
        if is_quiet_hours_now(now_utc, &self.quiet_start, &self.quiet_end, self.quiet_hours_enabled) {
            return Ok(Vec::new());
        }
        Ok(due)
    }

    /// Drop dedupe entries older than `older_than_days` from the reminder
    /// state file. The caller is responsible for invoking this
    /// periodically — `scan_once` never prunes on its own.
    pub fn prune_state(&self, older_than_days: i64) -> Result<()> {
        self.state.prune(older_than_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quiet_hours_crossing_midnight() {
        let at_23 = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        let at_05 = Utc.with_ymd_and_hms(2026, 1, 1, 5, 0, 0).unwrap();
        let at_noon = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(is_quiet_hours_now(at_23, "22:00", "06:00", true));
        assert!(is_quiet_hours_now(at_05, "22:00", "06:00", true));
        assert!(!is_quiet_hours_now(at_noon, "22:00", "06:00", true));
    }

    #[test]
    fn quiet_hours_disabled_never_suppresses() {
        let at_23 = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        assert!(!is_quiet_hours_now(at_23, "22:00", "06:00", false));
    }

    #[test]
    fn due_reminder_dedupes_via_state_store() {
        let dir = tempfile::tempdir().unwrap();
        let state = ProactiveStateStore::open(dir.path()).unwrap();
        let now = Utc::now();
        let events = vec![CalendarEvent {
            id: "evt1".into(),
            summary: "Standup".into(),
            start: Some(now + chrono::Duration::minutes(28)),
        }];
        let first = compute_due_calendar_reminders(&events, now, &[30, 10], 5, 180, &state).unwrap();
        assert_eq!(first.len(), 1);
        let second = compute_due_calendar_reminders(&events, now, &[30, 10], 5, 180, &state).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn all_day_events_without_start_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let state = ProactiveStateStore::open(dir.path()).unwrap();
        let events = vec![CalendarEvent { id: "allday".into(), summary: "Holiday".into(), start: None }];
        let due = compute_due_calendar_reminders(&events, Utc::now(), &[30, 10], 5, 180, &state).unwrap();
        assert!(due.is_empty());
    }
}
