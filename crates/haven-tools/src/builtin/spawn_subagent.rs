//! `spawn_subagent` tool — recursive one-shot dispatch into the agent loop,
//! bounded by a depth guard. Decoupled from `haven-agent` via the
//! `SubagentDispatcher` seam so this crate never depends on the loop crate.

use async_trait::async_trait;

use crate::tool::{Tool, ToolResult};

/// Implemented by the agent loop. Kept as a trait so `haven-tools` never
/// needs to depend on `haven-agent`.
#[async_trait::async_trait]
pub trait SubagentDispatcher: Send + Sync {
    /// Run `prompt` through a fresh one-shot turn at `depth` below the
    /// caller and return its final text.
    async fn process_direct(&self, prompt: &str, depth: u32) -> Result<String, String>;
}

pub struct SpawnSubagentTool {
    dispatcher: Box<dyn SubagentDispatcher>,
    max_depth: u32,
    depth: u32,
}

impl SpawnSubagentTool {
    pub fn new(dispatcher: Box<dyn SubagentDispatcher>, max_depth: u32, depth: u32) -> Self {
        Self {
            dispatcher,
            max_depth,
            depth,
        }
    }
}

#[async_trait]
impl Tool for SpawnSubagentTool {
    fn name(&self) -> &str {
        "spawn_subagent"
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a fresh one-shot subagent turn \
         and return its final answer. Use for work that benefits from an \
         isolated context rather than growing the current conversation."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "The task to hand off, written as a complete standalone prompt." }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let task = match input.get("task").and_then(|v| v.as_str()) {
            Some(t) if !t.is_empty() => t,
            _ => return ToolResult::error("missing required parameter: task"),
        };
        if self.depth >= self.max_depth {
            return ToolResult::error(format!(
                "subagent depth limit reached ({}); refusing to spawn further",
                self.max_depth
            ));
        }
        match self.dispatcher.process_direct(task, self.depth + 1).await {
            Ok(output) => ToolResult::success(output),
            Err(e) => ToolResult::error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl SubagentDispatcher for Echo {
        async fn process_direct(&self, prompt: &str, _depth: u32) -> Result<String, String> {
            Ok(format!("handled: {prompt}"))
        }
    }

    #[tokio::test]
    async fn depth_limit_refuses_to_spawn() {
        let tool = SpawnSubagentTool::new(Box::new(Echo), 2, 2);
        let result = tool.execute(serde_json::json!({"task": "x"})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn within_depth_dispatches() {
        let tool = SpawnSubagentTool::new(Box::new(Echo), 2, 0);
        let result = tool.execute(serde_json::json!({"task": "do thing"})).await;
        assert!(!result.is_error);
        assert!(result.content.contains("do thing"));
    }
}
