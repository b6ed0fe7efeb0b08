//! `execute_command` tool — one-shot shell command via `sh -c`, bounded by
//! `tools.exec.timeout`.

use async_trait::async_trait;
use tokio::process::Command;

use crate::tool::{Tool, ToolResult};

/// Substrings that make a command refuse to run outright. Scoped down from
/// the teacher's PTY-backed safety checker to a plain denylist.
const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "mkfs",
    ":(){ :|:& };:",
    "dd if=/dev/zero",
    "> /dev/sda",
];

fn check_command(command: &str) -> Result<(), String> {
    let lower = command.to_lowercase();
    for pattern in BLOCKED_PATTERNS {
        if lower.contains(pattern) {
            return Err(format!("command matches blocked pattern: {pattern}"));
        }
    }
    Ok(())
}

pub struct ExecuteCommandTool {
    timeout_secs: u32,
}

impl ExecuteCommandTool {
    pub fn new(timeout_secs: u32) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout and stderr. \
         Commands are safety-checked (dangerous commands like rm -rf /, \
         mkfs, fork bombs are blocked). Bounded by the configured timeout."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute via sh -c."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let command = match input.get("command").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("missing required parameter: command"),
        };

        if let Err(reason) = check_command(command) {
            return ToolResult::error(format!("blocked: {reason}"));
        }

        let timeout = std::time::Duration::from_secs(self.timeout_secs as u64);
        let child = Command::new("sh").arg("-c").arg(command).kill_on_drop(true).output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ToolResult::error(format!("failed to spawn command: {e}")),
            Err(_) => {
                return ToolResult::error(format!("command timed out after {}s", self.timeout_secs))
            }
        };

        let mut text = String::new();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.is_empty() {
            text.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("[stderr]\n");
            text.push_str(&stderr);
        }
        if let Some(code) = output.status.code() {
            if code != 0 {
                text.push_str(&format!("\n[exit code: {code}]"));
            }
        }
        if text.is_empty() {
            text = "(no output)".to_string();
        }

        ToolResult::success(text)
    }
}
