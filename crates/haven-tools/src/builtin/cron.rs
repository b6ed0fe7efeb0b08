//! `cron_create`/`cron_list`/`cron_enable`/`cron_disable`/`cron_delete` —
//! thin wrappers over [`haven_cron::CronEngine`], mirroring the grouping of
//! related tools the teacher uses for its knowledge-base pair.

use std::sync::Arc;

use async_trait::async_trait;
use haven_cron::{CronEngine, JobKind, Schedule};

use crate::tool::{Tool, ToolResult};

fn parse_kind(value: Option<&str>) -> Result<JobKind, String> {
    match value.unwrap_or("direct_message") {
        "direct_message" => Ok(JobKind::DirectMessage),
        "system_event" => Ok(JobKind::SystemEvent),
        "digest" => Ok(JobKind::Digest),
        other => Err(format!("unknown kind: {other}")),
    }
}

fn parse_schedule(value: &serde_json::Value) -> Result<Schedule, String> {
    let kind = value.get("kind").and_then(|v| v.as_str()).ok_or("schedule.kind is required")?;
    match kind {
        "every" => {
            let every_secs = value
                .get("every_secs")
                .and_then(|v| v.as_u64())
                .ok_or("schedule.every_secs is required for kind 'every'")?;
            Ok(Schedule::Every { every_secs })
        }
        "cron" => {
            let expression = value
                .get("expression")
                .and_then(|v| v.as_str())
                .ok_or("schedule.expression is required for kind 'cron'")?
                .to_string();
            Ok(Schedule::Cron { expression })
        }
        "at" => {
            let at = value
                .get("at")
                .and_then(|v| v.as_str())
                .ok_or("schedule.at is required for kind 'at'")?;
            let at = chrono::DateTime::parse_from_rfc3339(at)
                .map_err(|e| format!("invalid schedule.at: {e}"))?
                .with_timezone(&chrono::Utc);
            Ok(Schedule::At { at })
        }
        other => Err(format!("unknown schedule.kind: {other}")),
    }
}

pub struct CronCreateTool {
    engine: Arc<CronEngine>,
}

impl CronCreateTool {
    pub fn new(engine: Arc<CronEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for CronCreateTool {
    fn name(&self) -> &str {
        "cron_create"
    }

    fn description(&self) -> &str {
        "Create a scheduled job. Both modes run `action` through the model \
         as a one-shot turn: `self_dispatch: true` calls straight into \
         `process_direct` and publishes its reply; `false` materializes a \
         synthetic inbound message and lets it run the full agent turn over \
         the bus, the same path a real user message takes."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "schedule": {
                    "type": "object",
                    "description": "{kind: 'every', every_secs} | {kind: 'cron', expression} | {kind: 'at', at (RFC3339)}"
                },
                "action": { "type": "string", "description": "Prompt text run through the model as a one-shot turn." },
                "self_dispatch": { "type": "boolean", "default": false },
                "kind": { "type": "string", "enum": ["direct_message", "system_event", "digest"], "default": "direct_message" },
                "channel": { "type": "string" },
                "chat_id": { "type": "string" }
            },
            "required": ["name", "schedule", "action", "channel", "chat_id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return ToolResult::error("missing required parameter: name"),
        };
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing required parameter: action"),
        };
        let channel = match input.get("channel").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("missing required parameter: channel"),
        };
        let chat_id = match input.get("chat_id").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("missing required parameter: chat_id"),
        };
        let self_dispatch = input.get("self_dispatch").and_then(|v| v.as_bool()).unwrap_or(false);
        let kind = match parse_kind(input.get("kind").and_then(|v| v.as_str())) {
            Ok(k) => k,
            Err(e) => return ToolResult::error(e),
        };
        let schedule = match input.get("schedule") {
            Some(s) => match parse_schedule(s) {
                Ok(s) => s,
                Err(e) => return ToolResult::error(e),
            },
            None => return ToolResult::error("missing required parameter: schedule"),
        };

        match self.engine.add_job(name, schedule, action, self_dispatch, channel, chat_id, kind) {
            Ok(job) => ToolResult::success(format!("created job {} ({})", job.id, job.name)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct CronListTool {
    engine: Arc<CronEngine>,
}

impl CronListTool {
    pub fn new(engine: Arc<CronEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for CronListTool {
    fn name(&self) -> &str {
        "cron_list"
    }

    fn description(&self) -> &str {
        "List all scheduled jobs with their status and next run time."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResult {
        let jobs = self.engine.list_jobs();
        if jobs.is_empty() {
            return ToolResult::success("(no scheduled jobs)");
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|j| {
                format!(
                    "{} | {} | {:?} | enabled={} | next_run_at={:?}",
                    j.id, j.name, j.status, j.enabled, j.next_run_at
                )
            })
            .collect();
        ToolResult::success(lines.join("\n"))
    }
}

pub struct CronSetEnabledTool {
    engine: Arc<CronEngine>,
    enabled: bool,
}

impl CronSetEnabledTool {
    pub fn enable(engine: Arc<CronEngine>) -> Self {
        Self { engine, enabled: true }
    }

    pub fn disable(engine: Arc<CronEngine>) -> Self {
        Self { engine, enabled: false }
    }
}

#[async_trait]
impl Tool for CronSetEnabledTool {
    fn name(&self) -> &str {
        if self.enabled {
            "cron_enable"
        } else {
            "cron_disable"
        }
    }

    fn description(&self) -> &str {
        if self.enabled {
            "Re-enable a disabled scheduled job by id."
        } else {
            "Disable a scheduled job by id without deleting it."
        }
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let id = match input.get("id").and_then(|v| v.as_str()) {
            Some(id) => id,
            None => return ToolResult::error("missing required parameter: id"),
        };
        match self.engine.enable(id, self.enabled) {
            Ok(()) => ToolResult::success(format!("job {id} enabled={}", self.enabled)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct CronDeleteTool {
    engine: Arc<CronEngine>,
}

impl CronDeleteTool {
    pub fn new(engine: Arc<CronEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for CronDeleteTool {
    fn name(&self) -> &str {
        "cron_delete"
    }

    fn description(&self) -> &str {
        "Permanently delete a scheduled job by id."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let id = match input.get("id").and_then(|v| v.as_str()) {
            Some(id) => id,
            None => return ToolResult::error("missing required parameter: id"),
        };
        match self.engine.delete(id) {
            Ok(()) => ToolResult::success(format!("deleted job {id}")),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
