use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When and how often a job fires. Three variants per the data model: a
/// fixed interval, a cron expression, or a single absolute instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Every { every_secs: u64 },
    Cron { expression: String },
    At { at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// What a job's `action` represents, per the CronJob data model's
/// `payload.kind`. Informational — every kind fires the same way; this is
/// for tools and logging to classify jobs, not a dispatch switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[default]
    DirectMessage,
    SystemEvent,
    Digest,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectMessage => "direct_message",
            Self::SystemEvent => "system_event",
            Self::Digest => "digest",
        }
    }
}

/// A persisted job: either published to the bus targeting a channel/chat
/// (mode a), or self-dispatched through the agent's `process_direct` entry
/// point to produce a reply (mode b).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub schedule: Schedule,
    /// Payload classification, e.g. for a digest job that summarizes rather
    /// than converses.
    #[serde(default)]
    pub kind: JobKind,
    /// Prompt/content delivered on fire — materialized into a synthetic
    /// `InboundMessage.content` (mode a) or fed to `process_direct` as the
    /// one-shot prompt (mode b).
    pub action: String,
    /// When true, fire through `process_direct` to produce a model reply
    /// published as the outbound content (mode b); when false, publish a
    /// synthetic `InboundMessage` to the bus so it runs the full agent turn
    /// targeted at `channel`/`chat_id` (mode a).
    pub self_dispatch: bool,
    pub channel: String,
    pub chat_id: String,
    pub enabled: bool,
    pub status: JobStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub run_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A calendar event as surfaced by a `CalendarSource`, enough to compute
/// lead-time reminders against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    /// RFC 3339 start time. All-day events (date-only, no time component)
    /// are never scheduled for a reminder.
    pub start: Option<DateTime<Utc>>,
}

/// A due calendar reminder, computed by `compute_due_calendar_reminders`.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub event_id: String,
    pub summary: String,
    pub minutes_to_start: i64,
    pub lead_minutes: u32,
    pub reminder_key: String,
}
