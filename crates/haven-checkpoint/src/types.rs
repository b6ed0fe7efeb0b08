use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub at: String,
    pub event: String,
    #[serde(default)]
    pub detail: String,
}

/// One checkpoint file under `<workspace>/state/tasks/{task_id}.json`,
/// tracking a long-running tool invocation (subagent spawn, exec) across
/// process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCheckpoint {
    pub task_id: String,
    pub kind: String,
    pub status: TaskStatus,
    pub session_key: String,
    pub channel: String,
    pub chat_id: String,
    pub sender_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub finished_at: Option<String>,
    pub input_preview: String,
    #[serde(default)]
    pub output_preview: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub events: Vec<TaskEvent>,
}
