use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;

use haven_core::atomic::{atomic_write, read_optional};

use crate::error::CheckpointError;
use crate::types::{TaskCheckpoint, TaskEvent, TaskStatus};

fn compact_preview(text: &str, limit: usize) -> String {
    let compact = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= limit {
        compact
    } else {
        let truncated: String = compact.chars().take(limit).collect();
        format!("{truncated}...")
    }
}

/// Persists task checkpoints under `<workspace>/state/tasks/{task_id}.json`,
/// one file per task, every write going through
/// `haven_core::atomic::atomic_write`.
pub struct TaskCheckpointStore {
    tasks_dir: PathBuf,
}

impl TaskCheckpointStore {
    pub fn open(workspace: &Path) -> Result<Self, CheckpointError> {
        let tasks_dir = workspace.join("state").join("tasks");
        std::fs::create_dir_all(&tasks_dir)?;
        Ok(Self { tasks_dir })
    }

    fn task_path(&self, task_id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{task_id}.json"))
    }

    fn safe_read(&self, task_id: &str) -> Option<TaskCheckpoint> {
        let raw = read_optional(&self.task_path(task_id)).ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    fn safe_write(&self, checkpoint: &TaskCheckpoint) -> Result<(), CheckpointError> {
        let payload = serde_json::to_string_pretty(checkpoint)?;
        atomic_write(&self.task_path(&checkpoint.task_id), &payload)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &self,
        kind: &str,
        session_key: &str,
        channel: &str,
        chat_id: &str,
        sender_id: &str,
        input_text: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<String, CheckpointError> {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S");
        let task_id = format!("{timestamp}-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let now = Utc::now().to_rfc3339();
        let checkpoint = TaskCheckpoint {
            task_id: task_id.clone(),
            kind: kind.to_string(),
            status: TaskStatus::Running,
            session_key: session_key.to_string(),
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            created_at: now.clone(),
            updated_at: now.clone(),
            finished_at: None,
            input_preview: compact_preview(input_text, 1200),
            output_preview: String::new(),
            error: String::new(),
            metadata,
            events: vec![TaskEvent {
                at: now,
                event: "start".to_string(),
                detail: String::new(),
            }],
        };
        self.safe_write(&checkpoint)?;
        Ok(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<TaskCheckpoint> {
        self.safe_read(task_id)
    }

    pub fn append_event(&self, task_id: &str, event: &str, detail: &str) -> Result<bool, CheckpointError> {
        let Some(mut checkpoint) = self.safe_read(task_id) else {
            return Ok(false);
        };
        let now = Utc::now().to_rfc3339();
        let event_name = if event.trim().is_empty() { "event" } else { event.trim() };
        checkpoint.events.push(TaskEvent {
            at: now.clone(),
            event: event_name.to_string(),
            detail: compact_preview(detail, 240),
        });
        checkpoint.updated_at = now;
        self.safe_write(&checkpoint)?;
        Ok(true)
    }

    pub fn complete(
        &self,
        task_id: &str,
        output_text: &str,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<bool, CheckpointError> {
        let Some(mut checkpoint) = self.safe_read(task_id) else {
            return Ok(false);
        };
        let now = Utc::now().to_rfc3339();
        checkpoint.status = TaskStatus::Ok;
        checkpoint.updated_at = now.clone();
        checkpoint.finished_at = Some(now.clone());
        checkpoint.output_preview = compact_preview(output_text, 1200);
        checkpoint.error.clear();
        if let Some(extra) = metadata {
            checkpoint.metadata.extend(extra);
        }
        checkpoint.events.push(TaskEvent {
            at: now,
            event: "complete".to_string(),
            detail: String::new(),
        });
        self.safe_write(&checkpoint)?;
        Ok(true)
    }

    pub fn fail(
        &self,
        task_id: &str,
        error: &str,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<bool, CheckpointError> {
        let Some(mut checkpoint) = self.safe_read(task_id) else {
            return Ok(false);
        };
        let now = Utc::now().to_rfc3339();
        let error_preview = compact_preview(error, 600);
        checkpoint.status = TaskStatus::Error;
        checkpoint.updated_at = now.clone();
        checkpoint.finished_at = Some(now.clone());
        checkpoint.error = error_preview.clone();
        if let Some(extra) = metadata {
            checkpoint.metadata.extend(extra);
        }
        checkpoint.events.push(TaskEvent {
            at: now,
            event: "error".to_string(),
            detail: error_preview,
        });
        self.safe_write(&checkpoint)?;
        Ok(true)
    }

    /// Most recent still-`running` checkpoint for a session, newest task
    /// id first (task ids sort lexically by their leading timestamp).
    pub fn latest_running_for_session(&self, session_key: &str) -> Option<TaskCheckpoint> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.tasks_dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        entries.sort();
        entries.reverse();

        for path in entries {
            let Some(raw) = read_optional(&path).ok().flatten() else {
                continue;
            };
            let Ok(checkpoint) = serde_json::from_str::<TaskCheckpoint>(&raw) else {
                continue;
            };
            if checkpoint.session_key != session_key {
                continue;
            }
            if checkpoint.status != TaskStatus::Running {
                continue;
            }
            return Some(checkpoint);
        }
        None
    }

    pub fn mark_resumed(&self, task_id: &str) -> Result<bool, CheckpointError> {
        let Some(mut checkpoint) = self.safe_read(task_id) else {
            return Ok(false);
        };
        let now = Utc::now().to_rfc3339();
        let resume_count = checkpoint
            .metadata
            .get("resume_count")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            + 1;
        checkpoint
            .metadata
            .insert("resume_count".to_string(), Value::from(resume_count));
        checkpoint.updated_at = now.clone();
        checkpoint.events.push(TaskEvent {
            at: now,
            event: "resume".to_string(),
            detail: String::new(),
        });
        self.safe_write(&checkpoint)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TaskCheckpointStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskCheckpointStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn start_then_get_round_trips() {
        let (_dir, store) = store();
        let task_id = store
            .start("subagent", "cli:c1", "cli", "c1", "u1", "do the thing", HashMap::new())
            .unwrap();
        let checkpoint = store.get(&task_id).unwrap();
        assert_eq!(checkpoint.status, TaskStatus::Running);
        assert_eq!(checkpoint.events.len(), 1);
    }

    #[test]
    fn complete_updates_status_and_output() {
        let (_dir, store) = store();
        let task_id = store.start("exec", "cli:c1", "cli", "c1", "u1", "run ls", HashMap::new()).unwrap();
        assert!(store.complete(&task_id, "done", None).unwrap());
        let checkpoint = store.get(&task_id).unwrap();
        assert_eq!(checkpoint.status, TaskStatus::Ok);
        assert_eq!(checkpoint.output_preview, "done");
        assert!(checkpoint.finished_at.is_some());
    }

    #[test]
    fn latest_running_for_session_ignores_finished_tasks() {
        let (_dir, store) = store();
        let t1 = store.start("exec", "cli:c1", "cli", "c1", "u1", "first", HashMap::new()).unwrap();
        store.complete(&t1, "ok", None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let t2 = store.start("exec", "cli:c1", "cli", "c1", "u1", "second", HashMap::new()).unwrap();
        let latest = store.latest_running_for_session("cli:c1").unwrap();
        assert_eq!(latest.task_id, t2);
    }

    #[test]
    fn mark_resumed_increments_counter() {
        let (_dir, store) = store();
        let task_id = store.start("exec", "cli:c1", "cli", "c1", "u1", "task", HashMap::new()).unwrap();
        store.mark_resumed(&task_id).unwrap();
        store.mark_resumed(&task_id).unwrap();
        let checkpoint = store.get(&task_id).unwrap();
        assert_eq!(checkpoint.metadata.get("resume_count").and_then(|v| v.as_i64()), Some(2));
    }
}
