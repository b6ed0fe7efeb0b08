use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use haven_core::atomic::{atomic_write, read_optional};

use crate::error::{CronError, Result};
use crate::schedule::compute_next_run;
use crate::types::{Job, JobKind, JobStatus, Schedule};

/// Whole-file jobs store, persisted to `<workspace>/state/jobs.json` and
/// rewritten atomically on every mutation — mirrors the fact index and the
/// checkpoint store's single-writer-per-process model.
pub struct CronStore {
    path: PathBuf,
    jobs: Mutex<HashMap<String, Job>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
struct JobsFile {
    #[serde(default)]
    jobs: Vec<Job>,
}

impl CronStore {
    pub fn open(workspace: &Path) -> Result<Self> {
        let path = workspace.join("state").join("jobs.json");
        let jobs = match read_optional(&path)? {
            Some(raw) if !raw.trim().is_empty() => {
                let file: JobsFile = serde_json::from_str(&raw)?;
                file.jobs.into_iter().map(|j| (j.id.clone(), j)).collect()
            }
            _ => HashMap::new(),
        };
        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
        })
    }

    fn persist(&self, jobs: &HashMap<String, Job>) -> Result<()> {
        let mut list: Vec<&Job> = jobs.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let file = JobsFile {
            jobs: list.into_iter().cloned().collect(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        atomic_write(&self.path, &contents)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_job(
        &self,
        name: &str,
        schedule: Schedule,
        action: &str,
        self_dispatch: bool,
        channel: &str,
        chat_id: &str,
        kind: JobKind,
    ) -> Result<Job> {
        let now = Utc::now();
        let next_run_at = compute_next_run(&schedule, now)
            .ok_or_else(|| CronError::InvalidSchedule("schedule never fires".into()))?;
        let job = Job {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            schedule,
            kind,
            action: action.to_string(),
            self_dispatch,
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            enabled: true,
            status: JobStatus::Pending,
            last_run_at: None,
            next_run_at: Some(next_run_at),
            failure_count: 0,
            run_count: 0,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        };
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id.clone(), job.clone());
        self.persist(&jobs)?;
        Ok(job)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().unwrap();
        let mut list: Vec<Job> = jobs.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(id).cloned()
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| CronError::JobNotFound { id: id.to_string() })?;
        job.enabled = enabled;
        job.updated_at = Utc::now();
        self.persist(&jobs)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.remove(id).is_none() {
            return Err(CronError::JobNotFound { id: id.to_string() });
        }
        self.persist(&jobs)
    }

    /// Jobs whose `next_run_at` has arrived and are enabled + pending.
    pub fn due_jobs(&self, now: chrono::DateTime<Utc>) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.enabled && j.status == JobStatus::Pending)
            .filter(|j| j.next_run_at.is_some_and(|t| t <= now))
            .cloned()
            .collect()
    }

    /// Advance a fired job's schedule, clearing or bumping `failure_count`.
    pub fn record_run(&self, id: &str, now: chrono::DateTime<Utc>, ok: bool) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| CronError::JobNotFound { id: id.to_string() })?;
        job.last_run_at = Some(now);
        job.run_count += 1;
        job.updated_at = now;
        if ok {
            job.failure_count = 0;
        } else {
            job.failure_count += 1;
        }
        match compute_next_run(&job.schedule, now) {
            Some(next) => job.next_run_at = Some(next),
            None => {
                job.next_run_at = None;
                job.status = JobStatus::Completed;
            }
        }
        self.persist(&jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_persist_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CronStore::open(dir.path()).unwrap();
        let job = store
            .add_job(
                "reminder",
                Schedule::Every { every_secs: 60 },
                "ping",
                false,
                "cli",
                "self",
                JobKind::DirectMessage,
            )
            .unwrap();
        assert_eq!(store.list_jobs().len(), 1);

        let reopened = CronStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&job.id).unwrap().name, "reminder");
    }

    #[test]
    fn due_jobs_respects_next_run_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = CronStore::open(dir.path()).unwrap();
        let job = store
            .add_job(
                "future",
                Schedule::At { at: Utc::now() + chrono::Duration::days(1) },
                "noop",
                false,
                "cli",
                "self",
                JobKind::DirectMessage,
            )
            .unwrap();
        assert!(store.due_jobs(Utc::now()).is_empty());
        assert!(store.due_jobs(Utc::now() + chrono::Duration::days(2)).iter().any(|j| j.id == job.id));
    }

    #[test]
    fn record_run_completes_at_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = CronStore::open(dir.path()).unwrap();
        let job = store
            .add_job("once", Schedule::At { at: Utc::now() }, "noop", false, "cli", "self", JobKind::DirectMessage)
            .unwrap();
        store.record_run(&job.id, Utc::now(), true).unwrap();
        let updated = store.get(&job.id).unwrap();
        assert_eq!(updated.status, JobStatus::Completed);
        assert!(updated.next_run_at.is_none());
    }
}
