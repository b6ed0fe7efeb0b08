//! Per-session conversation log: an append-only turn journal plus a small
//! metadata sidecar, one pair of files per session key.
//!
//! Mirrors the file-per-entity pattern used by the checkpoint and cron
//! stores: `sessions/{key}.jsonl` holds the turn history (one JSON object
//! per line, never rewritten in place), `sessions/{key}.meta.json` holds
//! small per-session state (`last_summary_turn`, `approved_all`, ...).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use haven_core::atomic::{append_line, atomic_write, read_optional};
use haven_core::types::{SessionKey, SessionRole, SessionTurn};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Small per-session metadata bag, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(default)]
    pub last_summary_turn: u32,
    #[serde(default)]
    pub approved_all: bool,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn open(workspace: &Path) -> Result<Self, SessionError> {
        let dir = workspace.join("sessions");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn turns_path(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{}.jsonl", key.file_stem()))
    }

    fn meta_path(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{}.meta.json", key.file_stem()))
    }

    /// All turns for a session, oldest first. Empty if the session has never
    /// had a turn appended.
    pub fn history(&self, key: &SessionKey) -> Result<Vec<SessionTurn>, SessionError> {
        let path = self.turns_path(key);
        let raw = match read_optional(&path)? {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };
        let mut turns = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            turns.push(serde_json::from_str(line)?);
        }
        Ok(turns)
    }

    /// Last `n` turns, oldest first.
    pub fn recent_history(&self, key: &SessionKey, n: usize) -> Result<Vec<SessionTurn>, SessionError> {
        let mut turns = self.history(key)?;
        if turns.len() > n {
            turns = turns.split_off(turns.len() - n);
        }
        Ok(turns)
    }

    pub fn turn_count(&self, key: &SessionKey) -> Result<u32, SessionError> {
        Ok(self.history(key)?.len() as u32)
    }

    pub fn append_turn(
        &self,
        key: &SessionKey,
        role: SessionRole,
        content: impl Into<String>,
        tool_call_id: Option<String>,
        name: Option<String>,
    ) -> Result<(), SessionError> {
        let turn = SessionTurn {
            role,
            content: content.into(),
            tool_call_id,
            name,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let line = serde_json::to_string(&turn)?;
        append_line(&self.turns_path(key), &line)?;
        Ok(())
    }

    pub fn meta(&self, key: &SessionKey) -> Result<SessionMeta, SessionError> {
        match read_optional(&self.meta_path(key))? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(SessionMeta::default()),
        }
    }

    pub fn save_meta(&self, key: &SessionKey, meta: &SessionMeta) -> Result<(), SessionError> {
        let pretty = serde_json::to_string_pretty(meta)?;
        atomic_write(&self.meta_path(key), &pretty)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back_history_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let key = SessionKey::new("telegram", "42");

        store
            .append_turn(&key, SessionRole::User, "hi", None, None)
            .unwrap();
        store
            .append_turn(&key, SessionRole::Assistant, "hello", None, None)
            .unwrap();

        let history = store.history(&key).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].content, "hello");
    }

    #[test]
    fn recent_history_caps_to_n() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let key = SessionKey::new("cli", "self");
        for i in 0..5 {
            store
                .append_turn(&key, SessionRole::User, format!("turn {i}"), None, None)
                .unwrap();
        }
        let recent = store.recent_history(&key, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "turn 3");
        assert_eq!(recent[1].content, "turn 4");
    }

    #[test]
    fn meta_round_trips_and_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let key = SessionKey::new("telegram", "7");

        let meta = store.meta(&key).unwrap();
        assert_eq!(meta.last_summary_turn, 0);

        let mut updated = meta;
        updated.last_summary_turn = 12;
        updated.approved_all = true;
        store.save_meta(&key, &updated).unwrap();

        let reloaded = store.meta(&key).unwrap();
        assert_eq!(reloaded.last_summary_turn, 12);
        assert!(reloaded.approved_all);
    }
}
