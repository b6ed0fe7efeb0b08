//! `haven-cron` — job scheduling and proactive calendar reminders.
//!
//! Jobs persist to `state/jobs.json`, rewritten atomically on every
//! mutation. [`engine::CronEngine`] wakes once a second and fires any
//! enabled, pending job whose `next_run_at` has arrived. [`ProactiveEngine`]
//! is a separate, composed struct watching a [`CalendarSource`] for
//! upcoming events and computing due lead-time reminders, suppressed
//! during quiet hours.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod proactive;
pub mod schedule;
pub mod store;
pub mod types;

pub use dispatcher::CronDispatcher;
pub use engine::CronEngine;
pub use error::{CronError, Result};
pub use proactive::{
    compute_due_calendar_reminders, is_quiet_hours_now, CalendarSource, ProactiveEngine,
    ProactiveStateStore,
};
pub use schedule::compute_next_run;
pub use store::CronStore;
pub use types::{CalendarEvent, DueReminder, Job, JobKind, JobStatus, Schedule};
