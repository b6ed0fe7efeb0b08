//! `bash_session` tool — persistent shell session shared across all calls
//! in a process.
//!
//! Scoped down from the teacher's PTY-backed `TerminalManager`: one
//! long-lived `sh` child with piped stdio, commands written to stdin
//! followed by a unique sentinel echo, output read until the sentinel
//! appears. Shell state (cwd, exported vars, functions) persists across
//! calls the same way a PTY session would, just without terminal control
//! sequences to strip.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::tool::{Tool, ToolResult};

struct Session {
    child: Child,
    stdout: BufReader<tokio::process::ChildStdout>,
}

pub struct BashSessionTool {
    session: Mutex<Option<Session>>,
    timeout_secs: u32,
}

impl BashSessionTool {
    pub fn new(_workspace: std::sync::Arc<std::path::PathBuf>, timeout_secs: u32) -> Self {
        Self {
            session: Mutex::new(None),
            timeout_secs,
        }
    }

    fn spawn() -> std::io::Result<Child> {
        Command::new("sh")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }

    async fn run_locked(&self, command: &str) -> Result<String, String> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            let mut child = Self::spawn().map_err(|e| format!("failed to spawn shell: {e}"))?;
            let stdout = child.stdout.take().ok_or("missing stdout pipe")?;
            *guard = Some(Session {
                child,
                stdout: BufReader::new(stdout),
            });
        }

        let sentinel = format!("__DONE_{}__", uuid::Uuid::new_v4().simple());
        {
            let session = guard.as_mut().unwrap();
            let stdin = session
                .child
                .stdin
                .as_mut()
                .ok_or("missing stdin pipe")?;
            let payload = format!("{command}\necho \"{sentinel}\"\n");
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| format!("failed to write to shell: {e}"))?;
        }

        let timeout = std::time::Duration::from_secs(self.timeout_secs as u64);
        let read_fut = async {
            let session = guard.as_mut().unwrap();
            let mut buf = String::new();
            loop {
                let mut line = String::new();
                let n = session
                    .stdout
                    .read_line(&mut line)
                    .await
                    .map_err(|e| format!("failed to read from shell: {e}"))?;
                if n == 0 {
                    return Err("shell process closed stdout".to_string());
                }
                if line.trim_end() == sentinel {
                    break;
                }
                buf.push_str(&line);
            }
            Ok::<String, String>(buf)
        };

        match tokio::time::timeout(timeout, read_fut).await {
            Ok(result) => {
                let output = result?;
                let trimmed = output.trim_end().to_string();
                Ok(if trimmed.is_empty() {
                    "(no output)".to_string()
                } else {
                    trimmed
                })
            }
            Err(_) => {
                // Drop the dead session so the next call starts fresh.
                *guard = None;
                Err(format!(
                    "command timed out after {}s: {}",
                    self.timeout_secs,
                    command.chars().take(80).collect::<String>()
                ))
            }
        }
    }
}

#[async_trait]
impl Tool for BashSessionTool {
    fn name(&self) -> &str {
        "bash_session"
    }

    fn description(&self) -> &str {
        "Run a command in a persistent shell session. Shell state (working \
         directory, environment variables, shell functions) is preserved \
         across calls — a `cd` in one call stays in effect for the next. \
         Use for multi-step workflows: navigate, build, inspect, edit."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command or multi-line script to run."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let command = match input.get("command").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c,
            _ => return ToolResult::error("missing required parameter: command"),
        };

        match self.run_locked(command).await {
            Ok(output) => ToolResult::success(output),
            Err(e) => ToolResult::error(e),
        }
    }
}
